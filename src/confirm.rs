//! Confirmation gate for destructive operations
//!
//! Every mutating call goes through [`should_proceed`] first. The branch
//! order is fixed: dry-run suppresses the operation entirely, auto-approve
//! skips the prompt, otherwise the user is asked interactively.

use crate::context::ExecutionContext;
use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

/// Which branch of the gate applies for a given context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Log the intended action and do not proceed.
    DryRun,
    /// Proceed without asking.
    AutoApprove,
    /// Ask the user interactively.
    Prompt,
}

/// Pure branch decision. Dry-run always wins over auto-approve.
pub fn gate(ctx: &ExecutionContext) -> Gate {
    if ctx.dry_run {
        Gate::DryRun
    } else if ctx.auto_approve {
        Gate::AutoApprove
    } else {
        Gate::Prompt
    }
}

/// Decide whether a destructive operation may go ahead.
///
/// Returns `Ok(false)` for dry-run (after logging the intended action) and
/// for a declined prompt. Must be called before any mutating provider call.
pub fn should_proceed(ctx: &ExecutionContext, operation: &str) -> Result<bool> {
    match gate(ctx) {
        Gate::DryRun => {
            info!("{}would {}", ctx.log_prefix(), operation);
            Ok(false)
        }
        Gate::AutoApprove => {
            info!("{}auto-approving: {}", ctx.log_prefix(), operation);
            Ok(true)
        }
        Gate::Prompt => confirm(&format!("About to {operation}. Continue?")),
    }
}

/// Blocking yes/no prompt on stdin. Defaults to "no".
pub fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    std::io::stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read confirmation")?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
