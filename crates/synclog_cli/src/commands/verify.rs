//! Verify command implementation.

use std::path::Path;
use synclog_core::journal::{replay, Recovery};
use synclog_core::JOURNAL_FILE;
use synclog_storage::{FileBackend, StorageBackend};

/// Runs the verify command. The journal is only read.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {:?}", path);
    println!();

    let journal_path = path.join(JOURNAL_FILE);
    if !journal_path.exists() {
        println!("Journal file not found (this may be normal for new stores)");
        return Ok(());
    }

    let backend = FileBackend::open(&journal_path)?;
    match verify(&backend) {
        Ok(recovery) => {
            print_summary(&recovery);
            println!();
            if recovery.discarded_bytes() > 0 {
                println!(
                    "! {} bytes after the last committed batch will be discarded on next open",
                    recovery.discarded_bytes()
                );
            }
            println!("✓ Journal verification passed");
            Ok(())
        }
        Err(e) => {
            println!("  Error: {e}");
            println!();
            println!("✗ Journal verification failed");
            Err("Verification failed".into())
        }
    }
}

fn verify(backend: &dyn StorageBackend) -> Result<Recovery, synclog_core::CoreError> {
    replay(backend)
}

fn print_summary(recovery: &Recovery) {
    let accounts: std::collections::HashSet<_> =
        recovery.batches.iter().map(|b| b.account_id).collect();
    println!("  Journal size:       {} bytes", recovery.total_len);
    println!("  Committed batches:  {}", recovery.batches.len());
    println!("  Mutations:          {}", recovery.mutation_count());
    println!("  Accounts:           {}", accounts.len());
    println!("  Last sequence:      {}", recovery.last_sequence.as_u64());
}
