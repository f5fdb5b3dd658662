//! In-process VM worker speaking the real frame protocol, and a harness
//! that runs transactions against it.

#![allow(dead_code)]

use num_bigint::BigUint;
use scvm_codec::{LuaCode, LuaCodePayload};
use scvm_state::BlockState;
use scvm_types::{create_contract_id, BlockInfo, ForkVersion, Tx, TxBody, TxType};
use scvm_vm::wire::{read_message, send_message};
use scvm_vm::{
    execute, ExecParams, Execution, NoSystemContract, Services, StaticChain, StaticNames, VmError, VmInstance,
    VmSettings, WorkerSource,
};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Gas every fake frame reports.
pub const FRAME_GAS: u64 = 100;

pub const ABI: &str = r#"{"version":"0.2","language":"lua","functions":[
    {"name":"add","arguments":[{"name":"a"},{"name":"b"}]},
    {"name":"emit","arguments":[{"name":"n"}]},
    {"name":"recurse"},
    {"name":"pcall_send","arguments":[{"name":"to"},{"name":"fail"}]},
    {"name":"pcall_emit","arguments":[{"name":"fail"}]},
    {"name":"clone","arguments":[{"name":"from"}]},
    {"name":"pay","payable":true}
]}"#;

pub fn test_code() -> LuaCode {
    LuaCode::new(b"fake-bytecode", ABI.as_bytes())
}

/// Hands out workers backed by a thread on the other end of a socket pair.
#[derive(Default)]
pub struct FakeWorkers {
    next_id: AtomicU64,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl WorkerSource for FakeWorkers {
    fn acquire(&self, _fork: ForkVersion) -> Result<VmInstance, VmError> {
        let (node, vm) = UnixStream::pair().map_err(|e| VmError::VmStart(e.to_string()))?;
        thread::spawn(move || run_fake_vm(vm));
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(VmInstance::from_stream(id, node))
    }

    fn release(&self, _instance: VmInstance) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn run_fake_vm(conn: UnixStream) {
    loop {
        let Ok(msg) = read_message(&conn, None) else {
            return;
        };
        if msg.first().map(Vec::as_slice) == Some(b"compile".as_slice()) {
            let code = test_code();
            let frame: [&[u8]; 2] = [code.bytes(), b""];
            if send_message(&conn, &frame).is_err() {
                return;
            }
            continue;
        }
        if msg.first().map(Vec::as_slice) != Some(b"execute".as_slice()) || msg.len() != 9 {
            return;
        }
        let address = String::from_utf8_lossy(&msg[1]).into_owned();
        let fname = String::from_utf8_lossy(&msg[3]).into_owned();
        let args: Vec<serde_json::Value> = serde_json::from_slice(&msg[4]).unwrap_or_default();

        let (result, err) = match run_function(&conn, &address, &fname, &args) {
            Ok(result) => (result, String::new()),
            Err(e) => (String::new(), e),
        };
        let mut ret = FRAME_GAS.to_le_bytes().to_vec();
        ret.extend_from_slice(result.as_bytes());
        let frame: [&[u8]; 4] = [b"return", &ret, err.as_bytes(), b"0"];
        if send_message(&conn, &frame).is_err() {
            return;
        }
    }
}

/// Sends a host command and waits for its reply.
fn request(conn: &UnixStream, items: &[&str]) -> Result<Vec<u8>, String> {
    let mut frame: Vec<&[u8]> = items.iter().map(|s| s.as_bytes()).collect();
    frame.push(b"0");
    send_message(conn, &frame).map_err(|e| e.to_string())?;
    let reply = read_message(conn, None).map_err(|e| e.to_string())?;
    match reply.as_slice() {
        [result, err] if err.is_empty() => Ok(result.clone()),
        [_, err] => Err(String::from_utf8_lossy(err).into_owned()),
        _ => Err("malformed reply".to_string()),
    }
}

fn run_function(
    conn: &UnixStream,
    address: &str,
    fname: &str,
    args: &[serde_json::Value],
) -> Result<String, String> {
    match fname {
        "constructor" | "pay" => Ok(String::new()),
        "add" => {
            let sum: i64 = args.iter().filter_map(serde_json::Value::as_i64).sum();
            Ok(sum.to_string())
        }
        "emit" => {
            let n = args.first().and_then(serde_json::Value::as_u64).unwrap_or(0);
            for i in 0..n {
                request(conn, &["event", "ping", &format!("[{}]", i)])?;
            }
            Ok(n.to_string())
        }
        "recurse" => {
            let ret = request(conn, &["call", address, "recurse", "[]", "0", ""])?;
            Ok(String::from_utf8_lossy(ret.get(8..).unwrap_or_default()).into_owned())
        }
        "pcall_send" => {
            let to = args.first().and_then(serde_json::Value::as_str).unwrap_or_default();
            let fail = args.get(1).and_then(serde_json::Value::as_bool).unwrap_or(false);
            let seq = String::from_utf8_lossy(&request(conn, &["setRecoveryPoint"])?).into_owned();
            request(conn, &["set", "k", "v"])?;
            request(conn, &["send", to, "1", ""])?;
            request(conn, &["clearRecovery", &seq, if fail { "1" } else { "0" }])?;
            Ok(String::new())
        }
        "pcall_emit" => {
            let fail = args.first().and_then(serde_json::Value::as_bool).unwrap_or(false);
            request(conn, &["event", "before", "[]"])?;
            let count = String::from_utf8_lossy(&request(conn, &["getEventCount"])?).into_owned();
            let seq = String::from_utf8_lossy(&request(conn, &["setRecoveryPoint"])?).into_owned();
            request(conn, &["event", "inner", "[1]"])?;
            request(conn, &["clearRecovery", &seq, if fail { "1" } else { "0" }])?;
            if fail {
                request(conn, &["dropEvent", &count])?;
            }
            request(conn, &["event", "after", "[]"])?;
            Ok(String::new())
        }
        "clone" => {
            let from = args.first().and_then(serde_json::Value::as_str).unwrap_or_default();
            let ret = request(conn, &["deploy", from, "[]", "0", ""])?;
            Ok(String::from_utf8_lossy(ret.get(8..).unwrap_or_default()).into_owned())
        }
        other => Err(format!("not found function: {}", other)),
    }
}

/// Block state plus collaborators for running whole transactions.
pub struct Harness {
    pub bs: BlockState,
    pub workers: FakeWorkers,
    pub chain: StaticChain,
    pub names: StaticNames,
    pub system: NoSystemContract,
    pub settings: VmSettings,
    pub sender: Vec<u8>,
    pub fork: ForkVersion,
    nonce: u64,
}

impl Harness {
    /// Gas-metered chain at `fork` with a funded sender.
    pub fn new(fork: ForkVersion) -> Self {
        let mut bs = BlockState::new(BigUint::from(1u32));
        let sender = vec![0x03; 33];
        let mut account = bs.get_account_state(&sender);
        account.add_balance(&BigUint::from(1_000_000_000_000u64));
        bs.put_state(&account);
        Self {
            bs,
            workers: FakeWorkers::default(),
            chain: StaticChain::default(),
            names: StaticNames::new(),
            system: NoSystemContract,
            settings: VmSettings {
                pub_net: true,
                timeout: Duration::from_secs(10),
                ..Default::default()
            },
            sender,
            fork,
            nonce: 0,
        }
    }

    fn run(&mut self, recipient: Vec<u8>, body: TxBody) -> Execution {
        self.nonce += 1;
        let tx = Tx::new(self.nonce.to_le_bytes().to_vec(), body);
        let mut sender = self.bs.get_account_state(&self.sender);
        let mut receiver = self.bs.get_account_state(&recipient);
        let params = ExecParams {
            block: BlockInfo::new(10, 1_000, vec![7; 32], self.fork),
            ..Default::default()
        };
        let services = Services {
            workers: &self.workers,
            chain: &self.chain,
            names: &self.names,
            system: &self.system,
            sql: None,
            settings: &self.settings,
        };
        let execution = execute(&mut self.bs, services, &tx, &mut sender, &mut receiver, params);
        if execution.result.is_ok() {
            self.bs.put_state(&sender);
            self.bs.put_state(&receiver);
        }
        execution
    }

    /// Deploys the test contract and returns its raw id.
    pub fn deploy(&mut self) -> Vec<u8> {
        let id = create_contract_id(&self.sender, self.nonce + 1);
        let payload = LuaCodePayload::new(&test_code(), b"").bytes().to_vec();
        let body = TxBody {
            account: self.sender.clone(),
            payload,
            gas_limit: 1_000_000,
            tx_type: TxType::Deploy,
            ..Default::default()
        };
        let ex = self.run(id.clone(), body);
        assert!(ex.result.is_ok(), "deploy failed: {:?}", ex.result);
        id
    }

    /// Deploys Lua source instead of compiled code; the fake worker
    /// compiles any source to the test contract.
    pub fn deploy_source(&mut self, source: &str) -> (Vec<u8>, Execution) {
        let id = create_contract_id(&self.sender, self.nonce + 1);
        let mut payload = ((source.len() + 4) as u32).to_le_bytes().to_vec();
        payload.extend_from_slice(source.as_bytes());
        let body = TxBody {
            account: self.sender.clone(),
            payload,
            gas_limit: 1_000_000,
            tx_type: TxType::Deploy,
            ..Default::default()
        };
        let ex = self.run(id.clone(), body);
        (id, ex)
    }

    pub fn call(&mut self, contract: &[u8], payload: &str, amount: u64) -> Execution {
        let body = TxBody {
            account: self.sender.clone(),
            recipient: contract.to_vec(),
            amount: BigUint::from(amount),
            payload: payload.as_bytes().to_vec(),
            gas_limit: 1_000_000,
            tx_type: TxType::Call,
            ..Default::default()
        };
        self.run(contract.to_vec(), body)
    }

    pub fn fund(&mut self, id: &[u8], amount: u64) {
        let mut account = self.bs.get_account_state(id);
        account.add_balance(&BigUint::from(amount));
        self.bs.put_state(&account);
    }
}
