//! Pool of VM worker processes reached over abstract Unix sockets.
//!
//! A background thread owns spawning and destruction. Callers take ready
//! workers from a bounded channel and hand them back when done; a returned
//! worker is always destroyed and replaced.

use crate::error::VmError;
use crate::wire::{self, WireError};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::{Rng, RngCore};
use scvm_types::ForkVersion;
use std::collections::HashSet;
use std::io::{self, ErrorKind};
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixListener, UnixStream};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Spawn failures tolerated per batch before the pool gives up.
pub const MAX_SPAWN_FAILURES: usize = 10;
/// Minimum number of missing workers that triggers a respawn batch.
pub const REPOPULATE_THRESHOLD: usize = 5;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const ACCEPT_POLL: Duration = Duration::from_millis(5);
const READY_MESSAGE: &[u8] = b"ready";

/// A connected worker process.
pub struct VmInstance {
    id: u64,
    socket_name: String,
    conn: UnixStream,
    child: Option<Child>,
}

impl VmInstance {
    /// Wraps an already connected stream; used for in-process workers.
    pub fn from_stream(id: u64, conn: UnixStream) -> Self {
        Self {
            id,
            socket_name: socket_name(id),
            conn,
            child: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn socket_name(&self) -> &str {
        &self.socket_name
    }

    pub fn send<T: AsRef<[u8]>>(&self, items: &[T]) -> Result<(), WireError> {
        wire::send_message(&self.conn, items)
    }

    pub fn receive(&self, deadline: Option<Instant>) -> Result<Vec<Vec<u8>>, WireError> {
        wire::read_message(&self.conn, deadline)
    }
}

impl Drop for VmInstance {
    fn drop(&mut self) {
        let _ = wire::send_message(&self.conn, &[b"exit".as_slice()]);
        let _ = self.conn.shutdown(std::net::Shutdown::Both);
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl std::fmt::Debug for VmInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmInstance")
            .field("id", &self.id)
            .field("socket_name", &self.socket_name)
            .finish()
    }
}

pub fn socket_name(id: u64) -> String {
    format!("aergo-vm-{:x}", id)
}

/// Source of workers for executors.
pub trait WorkerSource: Send + Sync {
    /// Checks out a worker started for `fork`.
    fn acquire(&self, fork: ForkVersion) -> Result<VmInstance, VmError>;
    fn release(&self, instance: VmInstance);
}

/// Arguments handed to a freshly spawned worker.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub fork: ForkVersion,
    pub pub_net: bool,
    pub socket_name: String,
    pub secret_hex: String,
}

impl LaunchRequest {
    pub fn argv(&self) -> [String; 4] {
        [
            self.fork.to_string(),
            if self.pub_net { "1" } else { "0" }.to_string(),
            self.socket_name.clone(),
            self.secret_hex.clone(),
        ]
    }
}

/// Starts a worker that will connect back to the named socket.
pub trait Launcher: Send + 'static {
    fn launch(&self, request: &LaunchRequest) -> io::Result<Option<Child>>;
}

/// Launches the external VM executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    path: PathBuf,
}

impl ProcessLauncher {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path: path.unwrap_or_else(find_vm_executable) }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, request: &LaunchRequest) -> io::Result<Option<Child>> {
        let child = Command::new(&self.path).args(request.argv()).spawn()?;
        trace!(pid = child.id(), "spawned vm process");
        Ok(Some(child))
    }
}

/// Locates the VM executable: `AERGOVM_PATH`, then next to the current
/// executable, then the working directory, then `PATH`.
pub fn find_vm_executable() -> PathBuf {
    if let Some(p) = std::env::var_os("AERGOVM_PATH").filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(PathBuf::from)) {
        let candidate = dir.join("aergovm");
        if candidate.exists() {
            return candidate;
        }
    }
    let local = PathBuf::from("./aergovm");
    if local.exists() {
        return local;
    }
    PathBuf::from("aergovm")
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub size: usize,
    pub fork: ForkVersion,
    pub pub_net: bool,
}

#[derive(Debug)]
enum PoolCommand {
    Free(VmInstance),
    Repopulate,
    Close,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    pub_net: bool,
    fork: AtomicI32,
    available: AtomicUsize,
    running: AtomicBool,
    ready: Mutex<Receiver<VmInstance>>,
    commands: SyncSender<PoolCommand>,
}

/// The worker pool.
#[derive(Debug)]
pub struct VmPool {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl VmPool {
    /// Spawns the initial workers and the background thread. Returns once
    /// the first batch has been started.
    pub fn start(config: PoolConfig, launcher: Box<dyn Launcher>) -> Result<Self, VmError> {
        if config.size == 0 {
            return Err(VmError::VmStart("pool size must be positive".into()));
        }
        let (ready_tx, ready_rx) = mpsc::sync_channel(config.size);
        let (cmd_tx, cmd_rx) = mpsc::sync_channel(config.size * 2 + 1);
        let shared = Arc::new(Shared {
            size: config.size,
            pub_net: config.pub_net,
            fork: AtomicI32::new(config.fork),
            available: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            ready: Mutex::new(ready_rx),
            commands: cmd_tx,
        });

        let (started_tx, started_rx) = mpsc::channel();
        let worker = PoolWorker {
            shared: shared.clone(),
            ready: ready_tx,
            launcher,
            live: HashSet::new(),
        };
        let handle = thread::Builder::new()
            .name("vm-pool".into())
            .spawn(move || worker.run(cmd_rx, started_tx))
            .map_err(|e| VmError::VmStart(e.to_string()))?;

        started_rx
            .recv()
            .map_err(|_| VmError::VmStart("vm pool thread exited".into()))??;
        info!(size = config.size, fork = config.fork, "vm pool started");
        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    pub fn available(&self) -> usize {
        self.shared.available.load(Ordering::SeqCst)
    }

    pub fn fork(&self) -> ForkVersion {
        self.shared.fork.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Blocks until a worker is ready.
    pub fn get(&self) -> Result<VmInstance, VmError> {
        let instance = self
            .shared
            .ready
            .lock()
            .recv()
            .map_err(|_| VmError::VmStart("vm pool is closed".into()))?;
        self.shared.available.fetch_sub(1, Ordering::SeqCst);
        // a full queue already holds a pending repopulate
        if let Err(TrySendError::Disconnected(_)) = self.shared.commands.try_send(PoolCommand::Repopulate) {
            warn!("vm pool thread is not running");
        }
        Ok(instance)
    }

    pub fn free(&self, instance: VmInstance) {
        trace!(id = instance.id(), "vm instance released");
        // a closed pool hands the instance back, dropping it kills the worker
        let _ = self.shared.commands.send(PoolCommand::Free(instance));
    }

    /// Replaces every idle worker, e.g. after a fork change.
    pub fn flush_all(&self) -> Result<(), VmError> {
        let num = self.available();
        let mut taken = Vec::with_capacity(num);
        for _ in 0..num {
            taken.push(self.get()?);
        }
        for instance in taken {
            self.free(instance);
        }
        while self.available() == 0 {
            if !self.is_running() {
                return Err(VmError::VmStart("vm pool is closed".into()));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Stops the background thread and destroys all idle workers.
    pub fn stop(&self) {
        let _ = self.shared.commands.send(PoolCommand::Close);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        while let Ok(instance) = self.shared.ready.lock().try_recv() {
            drop(instance);
        }
        info!("vm pool stopped");
    }
}

impl WorkerSource for VmPool {
    fn acquire(&self, fork: ForkVersion) -> Result<VmInstance, VmError> {
        if self.shared.fork.swap(fork, Ordering::SeqCst) != fork {
            debug!(fork, "fork version changed, flushing vm pool");
            self.flush_all()?;
        }
        self.get()
    }

    fn release(&self, instance: VmInstance) {
        self.free(instance);
    }
}

struct Pending {
    id: u64,
    name: String,
    listener: UnixListener,
    child: Option<Child>,
}

struct PoolWorker {
    shared: Arc<Shared>,
    ready: SyncSender<VmInstance>,
    launcher: Box<dyn Launcher>,
    live: HashSet<u64>,
}

impl PoolWorker {
    fn run(mut self, commands: Receiver<PoolCommand>, started: mpsc::Sender<Result<(), VmError>>) {
        if let Err(e) = self.spawn(self.shared.size) {
            error!(error = %e, "failed to start vm pool");
            let _ = started.send(Err(e));
            return;
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let _ = started.send(Ok(()));

        while let Ok(cmd) = commands.recv() {
            let result = match cmd {
                PoolCommand::Free(instance) => {
                    self.live.remove(&instance.id());
                    drop(instance);
                    self.repopulate()
                }
                PoolCommand::Repopulate => self.repopulate(),
                PoolCommand::Close => break,
            };
            if let Err(e) = result {
                error!(error = %e, "vm pool failed");
                break;
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn repopulate(&mut self) -> Result<(), VmError> {
        let threshold = REPOPULATE_THRESHOLD.min(self.shared.size);
        loop {
            let missing = self.shared.size.saturating_sub(self.shared.available.load(Ordering::SeqCst));
            if missing == 0 || missing < threshold {
                return Ok(());
            }
            let before = self.shared.available.load(Ordering::SeqCst);
            self.spawn(missing)?;
            if self.shared.available.load(Ordering::SeqCst) <= before {
                // nothing connected this round; wait for the next release
                return Ok(());
            }
        }
    }

    fn fresh_id(&self) -> u64 {
        let mut rng = rand::thread_rng();
        loop {
            let id: u64 = rng.gen();
            if !self.live.contains(&id) {
                return id;
            }
        }
    }

    fn spawn(&mut self, num: usize) -> Result<(), VmError> {
        let mut failures = 0;
        let mut pending = Vec::with_capacity(num);
        let fork = self.shared.fork.load(Ordering::SeqCst);

        while pending.len() < num {
            let id = self.fresh_id();
            let mut secret = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            let name = socket_name(id);

            let attempt = bind_abstract(&name).and_then(|listener| {
                let request = LaunchRequest {
                    fork,
                    pub_net: self.shared.pub_net,
                    socket_name: name.clone(),
                    secret_hex: hex::encode(secret),
                };
                let child = self.launcher.launch(&request)?;
                Ok((listener, child))
            });
            match attempt {
                Ok((listener, child)) => {
                    self.live.insert(id);
                    pending.push(Pending { id, name, listener, child });
                }
                Err(e) => {
                    warn!(error = %e, socket = %name, "failed to spawn vm instance");
                    failures += 1;
                    if failures > MAX_SPAWN_FAILURES {
                        return Err(VmError::VmStart(format!(
                            "too many failures spawning vm instances: {}",
                            e
                        )));
                    }
                }
            }
        }

        let timeout = (Duration::from_millis(100) * num as u32).max(Duration::from_secs(1));
        let deadline = Instant::now() + timeout;
        for p in pending {
            let id = p.id;
            match connect_pending(p, deadline) {
                Ok(instance) => {
                    self.shared.available.fetch_add(1, Ordering::SeqCst);
                    if self.ready.send(instance).is_err() {
                        self.shared.available.fetch_sub(1, Ordering::SeqCst);
                        self.live.remove(&id);
                    }
                }
                Err(e) => {
                    error!(error = %e, id, "vm instance did not become ready");
                    self.live.remove(&id);
                }
            }
        }
        Ok(())
    }
}

fn bind_abstract(name: &str) -> io::Result<UnixListener> {
    let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
    let listener = UnixListener::bind_addr(&addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accepts the worker's connection and checks its `ready` frame. The
/// listener is closed in every case.
fn connect_pending(p: Pending, deadline: Instant) -> Result<VmInstance, WireError> {
    let Pending { id, name, listener, mut child } = p;
    let conn = loop {
        match listener.accept() {
            Ok((conn, _)) => break conn,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    kill(&mut child);
                    return Err(WireError::Timeout);
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                kill(&mut child);
                return Err(e.into());
            }
        }
    };
    drop(listener);
    conn.set_nonblocking(false)?;
    let instance = VmInstance {
        id,
        socket_name: name,
        conn,
        child,
    };
    let first = wire::read_frame(&instance.conn, Some(deadline))?;
    if first != READY_MESSAGE {
        return Err(WireError::Malformed("invalid ready message".into()));
    }
    Ok(instance)
}

fn kill(child: &mut Option<Child>) {
    if let Some(c) = child.as_mut() {
        let _ = c.kill();
        let _ = c.wait();
    }
}

static POOL: OnceCell<VmPool> = OnceCell::new();

/// Starts the process-wide pool once; later calls return the same pool.
pub fn start_vm_pool(config: PoolConfig, launcher: Box<dyn Launcher>) -> Result<&'static VmPool, VmError> {
    POOL.get_or_try_init(|| VmPool::start(config, launcher))
}

pub fn vm_pool() -> Option<&'static VmPool> {
    POOL.get()
}
