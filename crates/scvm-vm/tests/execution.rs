//! Whole transactions executed against an in-process worker.

mod common;

use common::{Harness, FRAME_GAS};
use num_bigint::BigUint;
use scvm_fee::tx_base_fee;
use scvm_types::{decode_address, encode_address, ReceiptStatus, Tx, TxBody, TxType};
use scvm_vm::VmError;
use std::sync::atomic::Ordering;

#[test]
fn test_deploy_then_call() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    assert!(h.bs.get_account_state(&ctr).is_contract());

    let payload = r#"{"Name":"add","Args":[1,2]}"#;
    let ex = h.call(&ctr, payload, 0);
    assert_eq!(ex.result, Ok("3".to_string()));

    let base = tx_base_fee(3, &BigUint::from(1u32), payload.len());
    assert_eq!(ex.used_fee, base + BigUint::from(FRAME_GAS));

    let tx = Tx::new(vec![1], TxBody { tx_type: TxType::Call, ..Default::default() });
    let receipt = ex.into_receipt(ctr, &tx, 3, &BigUint::from(1u32), false);
    assert_eq!(receipt.status, ReceiptStatus::Success);
    assert!(receipt.gas_used > FRAME_GAS);
}

#[test]
fn test_workers_are_returned() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    h.call(&ctr, r#"{"Name":"add","Args":[2,2]}"#, 0);
    let acquired = h.workers.acquired.load(Ordering::SeqCst);
    assert_eq!(acquired, 2);
    assert_eq!(h.workers.released.load(Ordering::SeqCst), acquired);
}

#[test]
fn test_payable_violation() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    let before = h.bs.balance(&h.sender);

    let ex = h.call(&ctr, r#"{"Name":"add","Args":[1,2]}"#, 1);
    assert_eq!(ex.result, Err(VmError::catchable("'add' is not payable")));
    assert_eq!(h.bs.balance(&ctr), BigUint::default());
    assert_eq!(h.bs.balance(&h.sender), before);

    let tx = Tx::new(vec![1], TxBody::default());
    let receipt = ex.into_receipt(ctr, &tx, 3, &BigUint::from(1u32), false);
    assert_eq!(receipt.status, ReceiptStatus::Error);
    assert_eq!(receipt.ret, "'add' is not payable");
}

#[test]
fn test_payable_function_receives_amount() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    let ex = h.call(&ctr, r#"{"Name":"pay","Args":[]}"#, 5);
    assert!(ex.result.is_ok(), "{:?}", ex.result);
    assert_eq!(h.bs.balance(&ctr), BigUint::from(5u32));
}

#[test]
fn test_unknown_function() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    let ex = h.call(&ctr, r#"{"Name":"nope","Args":[]}"#, 0);
    assert_eq!(ex.result, Err(VmError::catchable("not found function: nope")));
}

#[test]
fn test_event_limit_on_fork_4() {
    let mut h = Harness::new(4);
    let ctr = h.deploy();

    let ex = h.call(&ctr, r#"{"Name":"emit","Args":[128]}"#, 0);
    assert_eq!(ex.result, Ok("128".to_string()));
    assert_eq!(ex.events.len(), 128);
    assert_eq!(ex.events[127].json_args, "[127]");

    let ex = h.call(&ctr, r#"{"Name":"emit","Args":[129]}"#, 0);
    let err = ex.result.unwrap_err().to_string();
    assert!(err.contains("exceeded the maximum number of events(128)"), "{}", err);
}

#[test]
fn test_event_limit_before_fork_4() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    let ex = h.call(&ctr, r#"{"Name":"emit","Args":[51]}"#, 0);
    let err = ex.result.unwrap_err().to_string();
    assert!(err.contains("exceeded the maximum number of events(50)"), "{}", err);
}

#[test]
fn test_call_depth_limit() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    let ex = h.call(&ctr, r#"{"Name":"recurse","Args":[]}"#, 0);
    let err = ex.result.unwrap_err().to_string();
    assert!(err.contains("exceeded the maximum call depth(20)"), "{}", err);
    assert_eq!(
        h.workers.acquired.load(Ordering::SeqCst),
        h.workers.released.load(Ordering::SeqCst)
    );
}

#[test]
fn test_pcall_keeps_send() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    h.fund(&ctr, 10);
    let to = vec![0x02; 33];

    let payload = format!(r#"{{"Name":"pcall_send","Args":["{}",false]}}"#, encode_address(&to));
    let ex = h.call(&ctr, &payload, 0);
    assert!(ex.result.is_ok(), "{:?}", ex.result);
    assert_eq!(h.bs.balance(&to), BigUint::from(1u32));
    assert_eq!(h.bs.balance(&ctr), BigUint::from(9u32));
    assert_eq!(h.bs.open_contract_state(&ctr).get_data(b"k"), Some(b"v".as_slice()));
}

#[test]
fn test_pcall_failure_reverts_send_and_storage() {
    let mut h = Harness::new(3);
    let ctr = h.deploy();
    h.fund(&ctr, 10);
    let to = vec![0x02; 33];

    let payload = format!(r#"{{"Name":"pcall_send","Args":["{}",true]}}"#, encode_address(&to));
    let ex = h.call(&ctr, &payload, 0);
    assert!(ex.result.is_ok(), "{:?}", ex.result);
    assert_eq!(h.bs.balance(&to), BigUint::default());
    assert_eq!(h.bs.balance(&ctr), BigUint::from(10u32));
    assert_eq!(h.bs.open_contract_state(&ctr).get_data(b"k"), None);
}

#[test]
fn test_normal_tx_to_contract_rejected_on_fork_4() {
    let mut h = Harness::new(4);
    let ctr = h.deploy();
    let body = TxBody {
        account: h.sender.clone(),
        recipient: ctr.clone(),
        amount: BigUint::from(1u32),
        tx_type: TxType::Normal,
        ..Default::default()
    };
    let mut sender = h.bs.get_account_state(&h.sender);
    let mut receiver = h.bs.get_account_state(&ctr);
    let services = scvm_vm::Services {
        workers: &h.workers,
        chain: &h.chain,
        names: &h.names,
        system: &h.system,
        sql: None,
        settings: &h.settings,
    };
    let params = scvm_vm::ExecParams {
        block: scvm_types::BlockInfo::new(11, 0, vec![], 4),
        ..Default::default()
    };
    let ex = scvm_vm::execute(&mut h.bs, services, &Tx::new(vec![9], body), &mut sender, &mut receiver, params);
    assert_eq!(ex.result, Err(VmError::TxNotAllowedRecipient));
}

#[test]
fn test_failed_pcall_drops_its_events() {
    let mut h = Harness::new(4);
    let ctr = h.deploy();

    let ex = h.call(&ctr, r#"{"Name":"pcall_emit","Args":[true]}"#, 0);
    assert!(ex.result.is_ok(), "{:?}", ex.result);
    let tx = Tx::new(vec![1], TxBody { tx_type: TxType::Call, ..Default::default() });
    let receipt = ex.into_receipt(ctr.clone(), &tx, 4, &BigUint::from(1u32), false);
    let names: Vec<&str> = receipt.events.iter().map(|e| e.event_name.as_str()).collect();
    assert_eq!(names, ["before", "after"]);
    assert_eq!(receipt.events[1].event_idx, 1);

    let ex = h.call(&ctr, r#"{"Name":"pcall_emit","Args":[false]}"#, 0);
    assert_eq!(ex.events.len(), 3);
    assert_eq!(ex.events[2].event_idx, 2);
}

fn cloned_id(ret: &str) -> Vec<u8> {
    let addrs: Vec<String> = serde_json::from_str(ret).unwrap();
    decode_address(&addrs[0]).unwrap()
}

#[test]
fn test_deploy_by_address_skips_source_before_fork_4() {
    let mut h = Harness::new(3);
    let parent = h.deploy();
    let mut state = h.bs.open_contract_state(&parent);
    state.set_source_code(Some(b"function constructor() end".to_vec()));
    h.bs.stage_contract_state(state);

    let payload = format!(r#"{{"Name":"clone","Args":["{}"]}}"#, encode_address(&parent));
    let ex = h.call(&parent, &payload, 0);
    let child = cloned_id(&ex.result.unwrap());

    let child_state = h.bs.open_contract_state(&child);
    assert_eq!(child_state.get_code(), h.bs.open_contract_state(&parent).get_code());
    assert_eq!(child_state.source_code(), None);
}

#[test]
fn test_deploy_by_address_copies_source_on_fork_4() {
    let mut h = Harness::new(4);
    let source = "function constructor() end abi.register(add)";
    let (parent, ex) = h.deploy_source(source);
    assert!(ex.result.is_ok(), "deploy failed: {:?}", ex.result);
    assert_eq!(h.bs.open_contract_state(&parent).source_code(), Some(source.as_bytes()));

    let payload = format!(r#"{{"Name":"clone","Args":["{}"]}}"#, encode_address(&parent));
    let ex = h.call(&parent, &payload, 0);
    let child = cloned_id(&ex.result.unwrap());

    let child_state = h.bs.open_contract_state(&child);
    assert_eq!(child_state.get_code(), Some(common::test_code().bytes()));
    assert_eq!(child_state.source_code(), Some(source.as_bytes()));
    assert!(h.bs.get_account_state(&child).is_contract());
}

#[test]
fn test_source_deploy_rejected_before_fork_4() {
    let mut h = Harness::new(3);
    let (_, ex) = h.deploy_source("function constructor() end");
    assert!(ex.result.is_err());
    assert_eq!(h.workers.acquired.load(Ordering::SeqCst), 0);
}
