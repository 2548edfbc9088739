use scw_schemas::{
    CallType, ContractAction, ContractBytecode, ContractId, ContractStateChange, SidecarRecord,
    StorageChange, Timestamp,
};

pub fn consensus_at(seconds: i64) -> Timestamp {
    Timestamp::new(seconds, 0)
}

/// State-change record touching a single contract.
pub fn state_change(
    at: Timestamp,
    contract: ContractId,
    storage_changes: Vec<StorageChange>,
) -> SidecarRecord {
    SidecarRecord::state_changes(
        at,
        vec![ContractStateChange {
            contract_id: contract,
            storage_changes,
        }],
    )
}

pub fn bytecode_created(at: Timestamp, contract: ContractId, runtime: &str) -> SidecarRecord {
    SidecarRecord::bytecode(at, ContractBytecode::created(contract, "0x6080604052", runtime))
}

pub fn bytecode_failed(at: Timestamp, initcode: &str) -> SidecarRecord {
    SidecarRecord::bytecode(at, ContractBytecode::failed(initcode))
}

/// Single top-level call into `recipient`.
pub fn action_call(at: Timestamp, recipient: ContractId, gas_used: i64) -> SidecarRecord {
    SidecarRecord::actions(
        at,
        vec![ContractAction {
            call_type: CallType::Call,
            call_depth: 0,
            caller: None,
            recipient: Some(recipient),
            gas: 1_000_000,
            gas_used,
            value: 0,
            input: "0x".to_string(),
            output: "0x".to_string(),
        }],
    )
}
