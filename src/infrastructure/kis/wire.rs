//! Wire DTOs for the broker's JSON envelopes. Field names follow the
//! broker's own (terse, abbreviated) convention rather than this crate's
//! naming style, because they are deserialize targets for a fixed
//! external contract.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_expires_in() -> i64 {
    86_400
}

#[derive(Debug, Deserialize)]
pub struct HashkeyResponse {
    #[serde(rename = "HASH")]
    pub hash: String,
}

/// Common envelope fields present on every non-token broker response.
/// `rt_cd` of `"0"` or `"1"` denotes success; `msg1` is the human-readable
/// message preserved for classification and logging.
#[derive(Debug, Deserialize)]
pub struct BrokerEnvelope {
    pub rt_cd: String,
    #[serde(default)]
    pub msg_cd: String,
    #[serde(default)]
    pub msg1: String,
}

#[derive(Debug, Deserialize)]
pub struct QuoteOutput {
    pub stck_prpr: String,     // current price
    pub prdy_vrss: String,     // change vs prev day
    pub prdy_ctrt: String,     // change rate pct
    pub acml_vol: String,      // accumulated volume
    pub hts_kor_isnm: String,  // display name
}

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub envelope: BrokerEnvelope,
    pub output: Option<QuoteOutput>,
}

#[derive(Debug, Deserialize)]
pub struct CandleRow {
    pub stck_bsop_date: String, // YYYYMMDD or YYYYMMDDHHMM
    pub stck_oprc: String,
    pub stck_hgpr: String,
    pub stck_lwpr: String,
    pub stck_clpr: String,
    pub acml_vol: String,
}

#[derive(Debug, Deserialize)]
pub struct CandleResponse {
    #[serde(flatten)]
    pub envelope: BrokerEnvelope,
    #[serde(default)]
    pub output2: Vec<CandleRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingRow {
    pub mksc_shrn_iscd: String, // symbol
    pub hts_kor_isnm: String,   // display name
    pub stck_prpr: String,      // last price
    pub prdy_ctrt: String,      // change rate pct
    pub acml_vol: String,       // volume
    pub vol_inrt: String,       // volume ratio vs prev day
}

#[derive(Debug, Deserialize)]
pub struct RankingResponse {
    #[serde(flatten)]
    pub envelope: BrokerEnvelope,
    #[serde(default)]
    pub output: Vec<RankingRow>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceOutput1 {
    pub pdno: String,           // symbol
    pub prdt_name: String,      // display name
    pub hldg_qty: String,       // quantity
    pub ord_psbl_qty: String,   // sellable quantity
    pub pchs_avg_pric: String,  // average price
    pub prpr: String,           // current price
    pub evlu_amt: String,       // evaluation amount
    pub evlu_pfls_amt: String,  // unrealized pnl
    pub evlu_pfls_rt: String,   // unrealized pnl rate (pct)
}

#[derive(Debug, Deserialize)]
pub struct BalanceOutput2 {
    pub dnca_tot_amt: String,       // cash balance
    pub nxdy_excc_amt: String,      // available cash (next-day settlement)
    pub tot_evlu_amt: String,       // total evaluation
    pub evlu_pfls_smtl_amt: String, // realized pnl summary
}

#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    #[serde(flatten)]
    pub envelope: BrokerEnvelope,
    #[serde(default)]
    pub output1: Vec<BalanceOutput1>,
    #[serde(default)]
    pub output2: Vec<BalanceOutput2>,
}

#[derive(Debug, Deserialize)]
pub struct OrderOutput {
    #[serde(rename = "ODNO")]
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub envelope: BrokerEnvelope,
    pub output: Option<OrderOutput>,
}
