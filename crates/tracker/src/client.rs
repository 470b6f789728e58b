//! JSON-RPC client for the upstream chain indexer.
//!
//! One HTTP endpoint serves positional-row query results for the event
//! tables the tracker consumes. Every row is normalized here into the
//! canonical `rally-core` event types; malformed rows are logged and
//! dropped so one noisy row cannot halt a whole batch, and historical vs
//! live shape drift never reaches the engine.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use rally_core::types::{parse_address, parse_amount};
use rally_core::{CoreError, InviteRedeemed, InviteSent, Transfer, TrustEvent};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

/// Query namespace for the v2 hub views.
const NAMESPACE: &str = "V_CrcV2";

const TRANSFERS_TABLE: &str = "Transfers";
const TRUSTS_TABLE: &str = "TrustRelations";
const AVATARS_TABLE: &str = "Avatars";
const PROFILES_TABLE: &str = "Profiles";

const TRANSFER_COLUMNS: &[&str] = &[
    "blockNumber",
    "timestamp",
    "transactionHash",
    "from",
    "to",
    "value",
];
const TRUST_COLUMNS: &[&str] = &["timestamp", "truster", "trustee", "limit", "expiryTime"];
const AVATAR_COLUMNS: &[&str] = &["timestamp", "avatar", "invitedBy"];
const INVITE_SENT_COLUMNS: &[&str] = &["timestamp", "truster", "trustee"];
const PROFILE_COLUMNS: &[&str] = &["avatar", "name", "cidV0"];

/// HTTP client for the indexer's query endpoint.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    http: reqwest::Client,
    rpc_url: String,
    page_size: usize,
}

/// Raw query result: column names plus positional rows.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult {
    /// Column names, in row order.
    pub columns: Vec<String>,
    /// Positional rows.
    pub rows: Vec<Vec<Value>>,
}

/// Profile metadata row for one avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    /// Avatar address the profile belongs to.
    pub address: Address,
    /// Display name, when set.
    pub name: Option<String>,
    /// Content identifier of the profile document.
    pub cid_v0: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<QueryResult>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl IndexerClient {
    /// Create a new client for the given endpoint.
    pub fn new(rpc_url: impl Into<String>, page_size: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            page_size,
        }
    }

    /// Fetch qualifying-transfer candidates: transfers into the collection
    /// address within the window, ordered by timestamp ascending.
    ///
    /// Amount and sender filtering is the registry's concern; this returns
    /// everything addressed to the collection.
    pub async fn transfer_history(
        &self,
        collection: Address,
        window_start: u64,
        window_end: u64,
    ) -> Result<Vec<Transfer>> {
        let collection = addr_string(&collection);
        let transfers = self
            .paged(
                TRANSFERS_TABLE,
                TRANSFER_COLUMNS,
                |cursor| {
                    and(vec![
                        eq("to", json!(collection.clone())),
                        gte("timestamp", json!(cursor)),
                        lte("timestamp", json!(window_end)),
                    ])
                },
                window_start,
                decode_transfers,
            )
            .await?;

        // Page boundaries re-fetch rows sharing the cursor timestamp.
        let mut seen = HashSet::new();
        Ok(transfers
            .into_iter()
            .filter(|t| seen.insert(t.tx_hash.clone()))
            .collect())
    }

    /// Fetch all trust events touching the given addresses within the
    /// window, ordered by timestamp ascending.
    ///
    /// Grants and revocations are both included; folding them in order is
    /// what yields the current graph.
    pub async fn trust_history(
        &self,
        addresses: &[Address],
        window_start: u64,
        window_end: u64,
    ) -> Result<Vec<TrustEvent>> {
        let list = addr_strings(addresses);
        self.paged(
            TRUSTS_TABLE,
            TRUST_COLUMNS,
            |cursor| {
                and(vec![
                    or(vec![
                        in_list("truster", &list),
                        in_list("trustee", &list),
                    ]),
                    gte("timestamp", json!(cursor)),
                    lte("timestamp", json!(window_end)),
                ])
            },
            window_start,
            decode_trust_events,
        )
        .await
        // Duplicated boundary rows are harmless here: grants are idempotent
        // and a replayed revocation removes an already-absent edge.
    }

    /// Fetch accepted invitations credited to the given inviters.
    pub async fn invite_redemptions(
        &self,
        addresses: &[Address],
        window_start: u64,
        window_end: u64,
    ) -> Result<Vec<InviteRedeemed>> {
        let list = addr_strings(addresses);
        let redemptions = self
            .paged(
                AVATARS_TABLE,
                AVATAR_COLUMNS,
                |cursor| {
                    and(vec![
                        in_list("invitedBy", &list),
                        gte("timestamp", json!(cursor)),
                        lte("timestamp", json!(window_end)),
                    ])
                },
                window_start,
                decode_redemptions,
            )
            .await?;

        // An avatar redeems at most one invite; the invitee is the natural
        // dedup key across page boundaries.
        let mut seen = HashSet::new();
        Ok(redemptions
            .into_iter()
            .filter(|r| seen.insert(r.invitee))
            .collect())
    }

    /// Fetch invitations sent by the given addresses (trust relations whose
    /// trustee is an unredeemed invite avatar).
    pub async fn invites_sent(
        &self,
        addresses: &[Address],
        window_start: u64,
        window_end: u64,
    ) -> Result<Vec<InviteSent>> {
        let list = addr_strings(addresses);
        let sent = self
            .paged(
                TRUSTS_TABLE,
                INVITE_SENT_COLUMNS,
                |cursor| {
                    and(vec![
                        in_list("truster", &list),
                        eq("trusteeType", json!("Invite")),
                        gte("timestamp", json!(cursor)),
                        lte("timestamp", json!(window_end)),
                    ])
                },
                window_start,
                decode_invites_sent,
            )
            .await?;

        let mut seen = HashSet::new();
        Ok(sent
            .into_iter()
            .filter(|s| seen.insert((s.truster, s.invite)))
            .collect())
    }

    /// Fetch the invite backfill: redemptions plus sent invitations.
    pub async fn invite_history(
        &self,
        addresses: &[Address],
        window_start: u64,
        window_end: u64,
    ) -> Result<(Vec<InviteRedeemed>, Vec<InviteSent>)> {
        let redeemed = self
            .invite_redemptions(addresses, window_start, window_end)
            .await?;
        let sent = self.invites_sent(addresses, window_start, window_end).await?;
        Ok((redeemed, sent))
    }

    /// Fetch profile metadata rows for the given addresses.
    ///
    /// Address lists are bounded by registry size, so this is a single
    /// unpaginated query.
    pub async fn profile_rows(&self, addresses: &[Address]) -> Result<Vec<ProfileRow>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let list = addr_strings(addresses);
        let result = self
            .execute(query_params(
                PROFILES_TABLE,
                PROFILE_COLUMNS,
                in_list("avatar", &list),
                self.page_size.max(addresses.len()),
            ))
            .await?;
        decode_profiles(&result)
    }

    /// Run one paginated history query to completion.
    ///
    /// Pages are ordered by timestamp ascending starting at `window_start`.
    /// A page with exactly `page_size` rows may be truncated, so the loop
    /// re-queries from the last-seen timestamp; a short page terminates.
    async fn paged<T, F, D>(
        &self,
        table: &str,
        columns: &[&str],
        filter_at: F,
        window_start: u64,
        decode: D,
    ) -> Result<Vec<T>>
    where
        F: Fn(u64) -> Value,
        D: Fn(&QueryResult) -> Result<(Vec<T>, Option<u64>)>,
    {
        let mut cursor = window_start;
        let mut out = Vec::new();

        loop {
            let result = self
                .execute(query_params(table, columns, filter_at(cursor), self.page_size))
                .await
                .with_context(|| format!("Failed to fetch {} page at timestamp {}", table, cursor))?;

            let full_page = result.rows.len() >= self.page_size;
            let (items, last_timestamp) = decode(&result)?;
            out.extend(items);

            if !full_page {
                break;
            }
            match last_timestamp {
                Some(ts) if ts > cursor => cursor = ts,
                // A full page that cannot advance the cursor means more rows
                // share one timestamp than fit in a page; bail out rather
                // than refetch the same page forever.
                _ => {
                    warn!(
                        "{} backfill stopped: full page without timestamp progress at {}",
                        table, cursor
                    );
                    break;
                }
            }
        }

        Ok(out)
    }

    async fn execute(&self, params: Value) -> Result<QueryResult> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "circles_query",
            "params": [params],
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Indexer request to {} failed", self.rpc_url))?
            .error_for_status()
            .context("Indexer returned an HTTP error")?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .context("Failed to decode indexer response")?;

        if let Some(error) = envelope.error {
            anyhow::bail!("Indexer error {}: {}", error.code, error.message);
        }

        envelope
            .result
            .context("Indexer response carried neither result nor error")
    }
}

fn query_params(table: &str, columns: &[&str], filter: Value, limit: usize) -> Value {
    json!({
        "Namespace": NAMESPACE,
        "Table": table,
        "Columns": columns,
        "Filter": [filter],
        "Order": [{"Column": "timestamp", "SortOrder": "ASC"}],
        "Limit": limit,
    })
}

// Filter predicate builders, mirroring the endpoint's conjunction shape.

fn and(predicates: Vec<Value>) -> Value {
    json!({"Type": "Conjunction", "ConjunctionType": "And", "Predicates": predicates})
}

fn or(predicates: Vec<Value>) -> Value {
    json!({"Type": "Conjunction", "ConjunctionType": "Or", "Predicates": predicates})
}

fn eq(column: &str, value: Value) -> Value {
    json!({"Type": "FilterPredicate", "FilterType": "Equals", "Column": column, "Value": value})
}

fn gte(column: &str, value: Value) -> Value {
    json!({"Type": "FilterPredicate", "FilterType": "GreaterThanOrEquals", "Column": column, "Value": value})
}

fn lte(column: &str, value: Value) -> Value {
    json!({"Type": "FilterPredicate", "FilterType": "LessThanOrEquals", "Column": column, "Value": value})
}

fn in_list(column: &str, values: &[String]) -> Value {
    json!({"Type": "FilterPredicate", "FilterType": "In", "Column": column, "Value": values})
}

fn addr_string(address: &Address) -> String {
    format!("{:#x}", address)
}

fn addr_strings(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(addr_string).collect()
}

// Row decoding. Positional rows are resolved by column name; a missing
// column fails the whole batch (contract violation), a malformed value in
// one row drops just that row.

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(result: &QueryResult) -> Self {
        let index = result
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { index }
    }

    fn get(&self, name: &str) -> Result<usize, CoreError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::MissingColumn(name.to_string()))
    }
}

fn field<'a>(row: &'a [Value], idx: usize, column: &str) -> Result<&'a Value, CoreError> {
    row.get(idx)
        .ok_or_else(|| CoreError::MissingColumn(column.to_string()))
}

fn field_address(row: &[Value], idx: usize, column: &str) -> Result<Address, CoreError> {
    let value = field(row, idx, column)?;
    let text = value.as_str().ok_or_else(|| CoreError::MalformedValue {
        column: column.to_string(),
        value: value.to_string(),
    })?;
    parse_address(text)
}

fn field_u64(row: &[Value], idx: usize, column: &str) -> Result<u64, CoreError> {
    let value = field(row, idx, column)?;
    // Numeric columns arrive as JSON numbers from some deployments and as
    // decimal strings from others.
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    value
        .as_str()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| CoreError::MalformedValue {
            column: column.to_string(),
            value: value.to_string(),
        })
}

fn field_u256(row: &[Value], idx: usize, column: &str) -> Result<U256, CoreError> {
    let value = field(row, idx, column)?;
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    let text = value.as_str().ok_or_else(|| CoreError::MalformedValue {
        column: column.to_string(),
        value: value.to_string(),
    })?;
    parse_amount(text)
}

fn field_opt_str(row: &[Value], idx: usize) -> Option<String> {
    row.get(idx)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn decode_transfers(result: &QueryResult) -> Result<(Vec<Transfer>, Option<u64>)> {
    let cols = Columns::new(result);
    let block_idx = cols.get("blockNumber")?;
    let ts_idx = cols.get("timestamp")?;
    let hash_idx = cols.get("transactionHash")?;
    let from_idx = cols.get("from")?;
    let to_idx = cols.get("to")?;
    let value_idx = cols.get("value")?;

    let mut transfers = Vec::with_capacity(result.rows.len());
    let mut last_timestamp = None;

    for row in &result.rows {
        if let Ok(ts) = field_u64(row, ts_idx, "timestamp") {
            last_timestamp = Some(ts);
        }
        match decode_transfer_row(row, block_idx, ts_idx, hash_idx, from_idx, to_idx, value_idx) {
            Ok(transfer) => transfers.push(transfer),
            Err(e) => warn!("Dropping malformed transfer row: {}", e),
        }
    }

    Ok((transfers, last_timestamp))
}

#[allow(clippy::too_many_arguments)]
fn decode_transfer_row(
    row: &[Value],
    block_idx: usize,
    ts_idx: usize,
    hash_idx: usize,
    from_idx: usize,
    to_idx: usize,
    value_idx: usize,
) -> Result<Transfer, CoreError> {
    Ok(Transfer {
        from: field_address(row, from_idx, "from")?,
        to: field_address(row, to_idx, "to")?,
        value: field_u256(row, value_idx, "value")?,
        timestamp: field_u64(row, ts_idx, "timestamp")?,
        block_number: field_u64(row, block_idx, "blockNumber")?,
        tx_hash: field_opt_str(row, hash_idx).ok_or_else(|| CoreError::MalformedValue {
            column: "transactionHash".to_string(),
            value: row.get(hash_idx).map(|v| v.to_string()).unwrap_or_default(),
        })?,
    })
}

fn decode_trust_events(result: &QueryResult) -> Result<(Vec<TrustEvent>, Option<u64>)> {
    let cols = Columns::new(result);
    let ts_idx = cols.get("timestamp")?;
    let truster_idx = cols.get("truster")?;
    let trustee_idx = cols.get("trustee")?;
    let limit_idx = cols.get("limit")?;
    let expiry_idx = cols.get("expiryTime")?;

    let mut events = Vec::with_capacity(result.rows.len());
    let mut last_timestamp = None;

    for row in &result.rows {
        if let Ok(ts) = field_u64(row, ts_idx, "timestamp") {
            last_timestamp = Some(ts);
        }
        let decoded = (|| -> Result<TrustEvent, CoreError> {
            Ok(TrustEvent {
                truster: field_address(row, truster_idx, "truster")?,
                trustee: field_address(row, trustee_idx, "trustee")?,
                timestamp: field_u64(row, ts_idx, "timestamp")?,
                limit: field_u256(row, limit_idx, "limit")?,
                expiry: field_u64(row, expiry_idx, "expiryTime")?,
            })
        })();
        match decoded {
            Ok(event) => events.push(event),
            Err(e) => warn!("Dropping malformed trust row: {}", e),
        }
    }

    Ok((events, last_timestamp))
}

fn decode_redemptions(result: &QueryResult) -> Result<(Vec<InviteRedeemed>, Option<u64>)> {
    let cols = Columns::new(result);
    let ts_idx = cols.get("timestamp")?;
    let avatar_idx = cols.get("avatar")?;
    let inviter_idx = cols.get("invitedBy")?;

    let mut redemptions = Vec::with_capacity(result.rows.len());
    let mut last_timestamp = None;

    for row in &result.rows {
        if let Ok(ts) = field_u64(row, ts_idx, "timestamp") {
            last_timestamp = Some(ts);
        }
        let decoded = (|| -> Result<InviteRedeemed, CoreError> {
            Ok(InviteRedeemed {
                invited_by: field_address(row, inviter_idx, "invitedBy")?,
                invitee: field_address(row, avatar_idx, "avatar")?,
                timestamp: field_u64(row, ts_idx, "timestamp")?,
            })
        })();
        match decoded {
            Ok(redemption) => redemptions.push(redemption),
            Err(e) => warn!("Dropping malformed redemption row: {}", e),
        }
    }

    Ok((redemptions, last_timestamp))
}

fn decode_invites_sent(result: &QueryResult) -> Result<(Vec<InviteSent>, Option<u64>)> {
    let cols = Columns::new(result);
    let ts_idx = cols.get("timestamp")?;
    let truster_idx = cols.get("truster")?;
    let trustee_idx = cols.get("trustee")?;

    let mut sent = Vec::with_capacity(result.rows.len());
    let mut last_timestamp = None;

    for row in &result.rows {
        if let Ok(ts) = field_u64(row, ts_idx, "timestamp") {
            last_timestamp = Some(ts);
        }
        let decoded = (|| -> Result<InviteSent, CoreError> {
            Ok(InviteSent {
                truster: field_address(row, truster_idx, "truster")?,
                invite: field_address(row, trustee_idx, "trustee")?,
                timestamp: field_u64(row, ts_idx, "timestamp")?,
            })
        })();
        match decoded {
            Ok(item) => sent.push(item),
            Err(e) => warn!("Dropping malformed invite row: {}", e),
        }
    }

    Ok((sent, last_timestamp))
}

fn decode_profiles(result: &QueryResult) -> Result<Vec<ProfileRow>> {
    let cols = Columns::new(result);
    let avatar_idx = cols.get("avatar")?;
    let name_idx = cols.get("name")?;
    let cid_idx = cols.get("cidV0")?;

    let mut rows = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        match field_address(row, avatar_idx, "avatar") {
            Ok(address) => rows.push(ProfileRow {
                address,
                name: field_opt_str(row, name_idx),
                cid_v0: field_opt_str(row, cid_idx),
            }),
            Err(e) => warn!("Dropping malformed profile row: {}", e),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(columns: &[&str], rows: Value) -> QueryResult {
        serde_json::from_value(json!({"columns": columns, "rows": rows})).unwrap()
    }

    #[test]
    fn test_decode_transfers() {
        let result = result(
            TRANSFER_COLUMNS,
            json!([
                [
                    100, 1500, "0xhash1",
                    "0x1111111111111111111111111111111111111111",
                    "0x2222222222222222222222222222222222222222",
                    "2000000000000000000"
                ],
                // Malformed sender: dropped, not fatal.
                [101, 1600, "0xhash2", "garbage", "0x2222222222222222222222222222222222222222", "1"],
            ]),
        );

        let (transfers, last_ts) = decode_transfers(&result).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(last_ts, Some(1600));
        assert_eq!(transfers[0].timestamp, 1500);
        assert_eq!(transfers[0].block_number, 100);
        assert_eq!(
            transfers[0].value,
            U256::from(2) * U256::from(10).pow(U256::from(18))
        );
    }

    #[test]
    fn test_decode_transfers_missing_column_is_fatal() {
        let result = result(&["timestamp", "from"], json!([]));
        assert!(decode_transfers(&result).is_err());
    }

    #[test]
    fn test_decode_trust_events_mixed_value_shapes() {
        let result = result(
            TRUST_COLUMNS,
            json!([
                // expiryTime as string, limit as string: a historical shape.
                [
                    1500,
                    "0x1111111111111111111111111111111111111111",
                    "0x2222222222222222222222222222222222222222",
                    "100", "9999999999"
                ],
                // expiryTime as number, limit as number: a live shape.
                [
                    1600,
                    "0x2222222222222222222222222222222222222222",
                    "0x1111111111111111111111111111111111111111",
                    0, 0
                ],
            ]),
        );

        let (events, last_ts) = decode_trust_events(&result).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(last_ts, Some(1600));
        assert_eq!(events[0].expiry, 9_999_999_999);
        assert_eq!(events[0].action(), rally_core::TrustAction::Grant);
        assert_eq!(events[1].action(), rally_core::TrustAction::Revoke);
    }

    #[test]
    fn test_decode_redemptions_case_normalizes() {
        let result = result(
            AVATAR_COLUMNS,
            json!([
                [1500, "0x3333333333333333333333333333333333333333",
                 "0xDE374ECE6FA50E781E81AAC78E811B33D16912C7"],
                [1501, "0x4444444444444444444444444444444444444444",
                 "0xde374ece6fa50e781e81aac78e811b33d16912c7"],
            ]),
        );

        let (redemptions, _) = decode_redemptions(&result).unwrap();
        assert_eq!(redemptions.len(), 2);
        // Mixed-case spellings of the same inviter collapse to one identity.
        assert_eq!(redemptions[0].invited_by, redemptions[1].invited_by);
    }

    #[test]
    fn test_decode_profiles_empty_fields_become_none() {
        let result = result(
            PROFILE_COLUMNS,
            json!([
                ["0x1111111111111111111111111111111111111111", "alice", "Qm123"],
                ["0x2222222222222222222222222222222222222222", "", null],
            ]),
        );

        let rows = decode_profiles(&result).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name.as_deref(), Some("alice"));
        assert_eq!(rows[0].cid_v0.as_deref(), Some("Qm123"));
        assert_eq!(rows[1].name, None);
        assert_eq!(rows[1].cid_v0, None);
    }

    #[test]
    fn test_addr_string_is_lowercase() {
        let addr = parse_address("0xDE374ECE6FA50E781E81AAC78E811B33D16912C7").unwrap();
        assert_eq!(
            addr_string(&addr),
            "0xde374ece6fa50e781e81aac78e811b33d16912c7"
        );
    }
}
