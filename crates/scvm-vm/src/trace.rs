use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Per-block execution trace in the temp directory.
#[derive(Debug)]
pub struct TraceFile {
    file: File,
}

pub fn trace_path(block_no: u64) -> PathBuf {
    std::env::temp_dir().join(format!("{}.trace", block_no))
}

impl TraceFile {
    /// Opens the trace of `block_no` for appending and starts a tx section.
    pub fn open(block_no: u64, tx_hash: &[u8]) -> Option<Self> {
        let path = trace_path(block_no);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let mut trace = Self { file };
                trace.line(&format!("[START TX]: {}", bs58::encode(tx_hash).into_string()));
                Some(trace)
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to open trace file");
                None
            }
        }
    }

    pub fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.file, "{}", text) {
            warn!(error = %e, "failed to write trace file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_lines() {
        let block_no = 900_000_000 + std::process::id() as u64;
        let path = trace_path(block_no);
        let _ = std::fs::remove_file(&path);
        {
            let mut trace = TraceFile::open(block_no, &[1, 2, 3]).unwrap();
            trace.line("[ret] : 1");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[START TX]: Ldp\n[ret] : 1\n");
        std::fs::remove_file(&path).unwrap();
    }
}
