//! scw-schemas
//!
//! Sidecar record model shared by the reconciler, the watcher and the test
//! fixtures. Every type compares structurally: two records are equal iff all
//! of their fields are equal.
//!
//! Storage words (slots and values) are carried as lowercase `0x`-prefixed hex
//! with leading zeros trimmed. Deserialization normalizes them, so `"0x0037"`
//! and `"0x37"` compare equal. Bytecode and call data are compared as the raw
//! hex text they were written with.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus timestamp of the transaction a sidecar record belongs to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos() as i32,
        }
    }

    /// `None` when `nanos` is negative or the pair is out of chrono's range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.nanos).ok()?;
        Utc.timestamp_opt(self.seconds, nanos).single()
    }
}

/// `shard.realm.num` contract identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ContractId {
    pub shard: i64,
    pub realm: i64,
    pub num: i64,
}

impl ContractId {
    /// Contract in shard 0, realm 0.
    pub fn num(num: i64) -> Self {
        Self {
            shard: 0,
            realm: 0,
            num,
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

/// Minimal hex encoding of a 64-bit word (`0` -> `"0x0"`, `55` -> `"0x37"`).
pub fn hex_word(v: u64) -> String {
    format!("0x{v:x}")
}

/// Canonical form of a hex storage word of any width: lowercase, `0x` prefix,
/// no leading zeros (`"0X0037"` -> `"0x37"`, `"0x000"` -> `"0x0"`).
/// Text that is not hex is returned unchanged so it still shows up as a
/// mismatch.
pub fn normalize_hex_word(s: &str) -> String {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return s.to_string();
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{}", trimmed.to_ascii_lowercase())
    }
}

fn de_hex_word<'de, D>(d: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(d).map(|s| normalize_hex_word(&s))
}

fn de_opt_hex_word<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(d).map(|o| o.map(|s| normalize_hex_word(&s)))
}

// ---------------------------------------------------------------------------
// Record kinds
// ---------------------------------------------------------------------------

/// Discriminant of a sidecar record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Bytecode,
    StateChange,
    Action,
}

/// Kinds that take part in expected/actual comparison.
pub const COMPARABLE_KINDS: &[RecordKind] = &[RecordKind::Bytecode, RecordKind::StateChange];

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Bytecode => "BYTECODE",
            RecordKind::StateChange => "STATE_CHANGE",
            RecordKind::Action => "ACTION",
        }
    }

    /// Action records are observed but never compared.
    pub fn is_comparable(&self) -> bool {
        COMPARABLE_KINDS.contains(self)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State changes
// ---------------------------------------------------------------------------

/// One storage slot touched by a contract. `value_written` is absent for
/// read-only accesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageChange {
    #[serde(deserialize_with = "de_hex_word")]
    pub slot: String,
    #[serde(deserialize_with = "de_hex_word")]
    pub value_read: String,
    #[serde(
        default,
        deserialize_with = "de_opt_hex_word",
        skip_serializing_if = "Option::is_none"
    )]
    pub value_written: Option<String>,
}

impl StorageChange {
    pub fn read_only(slot: u64, value_read: u64) -> Self {
        Self {
            slot: hex_word(slot),
            value_read: hex_word(value_read),
            value_written: None,
        }
    }

    pub fn read_write(slot: u64, value_read: u64, value_written: u64) -> Self {
        Self {
            slot: hex_word(slot),
            value_read: hex_word(value_read),
            value_written: Some(hex_word(value_written)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStateChange {
    pub contract_id: ContractId,
    pub storage_changes: Vec<StorageChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStateChanges {
    pub contract_state_changes: Vec<ContractStateChange>,
}

// ---------------------------------------------------------------------------
// Bytecode
// ---------------------------------------------------------------------------

/// Bytecode of a created contract. A failed creation has no `contract_id` and
/// an empty `runtime_bytecode`; only the initcode is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractBytecode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<ContractId>,
    pub initcode: String,
    #[serde(default)]
    pub runtime_bytecode: String,
}

impl ContractBytecode {
    pub fn created(
        contract_id: ContractId,
        initcode: impl Into<String>,
        runtime_bytecode: impl Into<String>,
    ) -> Self {
        Self {
            contract_id: Some(contract_id),
            initcode: initcode.into(),
            runtime_bytecode: runtime_bytecode.into(),
        }
    }

    pub fn failed(initcode: impl Into<String>) -> Self {
        Self {
            contract_id: None,
            initcode: initcode.into(),
            runtime_bytecode: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    NoAction,
    Call,
    Create,
    Precompile,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAction {
    pub call_type: CallType,
    pub call_depth: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<ContractId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ContractId>,
    pub gas: i64,
    pub gas_used: i64,
    pub value: i64,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractActions {
    pub contract_actions: Vec<ContractAction>,
}

// ---------------------------------------------------------------------------
// Records and container
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SidecarPayload {
    StateChanges(ContractStateChanges),
    Actions(ContractActions),
    Bytecode(ContractBytecode),
}

/// One unit of traced execution output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub consensus_timestamp: Timestamp,
    pub payload: SidecarPayload,
}

impl SidecarRecord {
    pub fn state_changes(consensus_timestamp: Timestamp, changes: Vec<ContractStateChange>) -> Self {
        Self {
            consensus_timestamp,
            payload: SidecarPayload::StateChanges(ContractStateChanges {
                contract_state_changes: changes,
            }),
        }
    }

    pub fn actions(consensus_timestamp: Timestamp, actions: Vec<ContractAction>) -> Self {
        Self {
            consensus_timestamp,
            payload: SidecarPayload::Actions(ContractActions {
                contract_actions: actions,
            }),
        }
    }

    pub fn bytecode(consensus_timestamp: Timestamp, bytecode: ContractBytecode) -> Self {
        Self {
            consensus_timestamp,
            payload: SidecarPayload::Bytecode(bytecode),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match &self.payload {
            SidecarPayload::StateChanges(_) => RecordKind::StateChange,
            SidecarPayload::Actions(_) => RecordKind::Action,
            SidecarPayload::Bytecode(_) => RecordKind::Bytecode,
        }
    }

    pub fn is_comparable(&self) -> bool {
        self.kind().is_comparable()
    }
}

/// Container written by the producer: zero or more records, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarFile {
    pub sidecar_records: Vec<SidecarRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_zero_change(before: u64, after: u64) -> SidecarRecord {
        SidecarRecord::state_changes(
            Timestamp::new(1_700_000_000, 5),
            vec![ContractStateChange {
                contract_id: ContractId::num(1001),
                storage_changes: vec![StorageChange::read_write(0, before, after)],
            }],
        )
    }

    #[test]
    fn kinds_and_comparability() {
        let sc = slot_zero_change(55, 55);
        assert_eq!(sc.kind(), RecordKind::StateChange);
        assert!(sc.is_comparable());

        let bc = SidecarRecord::bytecode(Timestamp::default(), ContractBytecode::failed("0x6080"));
        assert_eq!(bc.kind(), RecordKind::Bytecode);
        assert!(bc.is_comparable());

        let ac = SidecarRecord::actions(Timestamp::default(), vec![]);
        assert_eq!(ac.kind(), RecordKind::Action);
        assert!(!ac.is_comparable());
    }

    #[test]
    fn padded_storage_words_decode_to_canonical_form() {
        let padded: StorageChange = serde_json::from_str(
            r#"{"slot":"0x00","value_read":"0x0037","value_written":"0x003C"}"#,
        )
        .unwrap();
        assert_eq!(padded, StorageChange::read_write(0, 55, 60));

        let read_only: StorageChange =
            serde_json::from_str(r#"{"slot":"0x0001","value_read":"0x0"}"#).unwrap();
        assert_eq!(read_only, StorageChange::read_only(1, 0));
    }

    #[test]
    fn normalize_hex_word_forms() {
        assert_eq!(normalize_hex_word("0x000"), "0x0");
        assert_eq!(normalize_hex_word("0X00Ab"), "0xab");
        assert_eq!(normalize_hex_word("ff"), "0xff");
        // Not hex: left alone.
        assert_eq!(normalize_hex_word("0xzz"), "0xzz");
        assert_eq!(normalize_hex_word(""), "");
    }

    #[test]
    fn bytecode_text_is_not_normalized() {
        let bc: ContractBytecode = serde_json::from_str(
            r#"{"contract_id":null,"initcode":"0x0060","runtime_bytecode":"0x"}"#,
        )
        .unwrap();
        assert_eq!(bc.initcode, "0x0060");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(slot_zero_change(55, 55), slot_zero_change(55, 55));
        assert_ne!(slot_zero_change(55, 55), slot_zero_change(55, 60));
    }

    #[test]
    fn hex_word_is_minimal() {
        assert_eq!(hex_word(0), "0x0");
        assert_eq!(hex_word(55), "0x37");
        assert_eq!(hex_word(60), "0x3c");
    }

    #[test]
    fn payload_is_tagged_by_kind() {
        let v = serde_json::to_value(slot_zero_change(55, 60)).unwrap();
        assert_eq!(v["payload"]["kind"], "state_changes");
        assert_eq!(
            v["payload"]["contract_state_changes"][0]["storage_changes"][0]["value_written"],
            "0x3c"
        );
    }

    #[test]
    fn read_only_change_omits_written_value() {
        let v = serde_json::to_value(StorageChange::read_only(1, 7)).unwrap();
        assert!(v.get("value_written").is_none());
    }

    #[test]
    fn timestamp_datetime_conversion() {
        let ts = Timestamp::new(1_700_000_000, 123_456_789);
        let dt = ts.to_datetime().unwrap();
        assert_eq!(Timestamp::from_datetime(dt), ts);
        assert!(Timestamp::new(0, -1).to_datetime().is_none());
    }

    #[test]
    fn contract_id_display() {
        assert_eq!(ContractId::num(1001).to_string(), "0.0.1001");
    }
}
