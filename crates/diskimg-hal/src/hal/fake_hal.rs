//! Fake HAL implementation for testing.
//!
//! This implementation records all invocations without executing them and
//! answers with scripted outputs, allowing CI-safe testing of the mount
//! orchestration without root privileges, loop devices or kpartx.

use super::{CommandOutput, Invocation, ProcessOps};
use crate::HalResult;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared state for FakeHal invocations.
#[derive(Debug, Default)]
struct FakeHalState {
    /// Every invocation, in execution order.
    invocations: Vec<Invocation>,
    /// One-shot outputs per program, consumed front to back.
    scripted: HashMap<String, VecDeque<CommandOutput>>,
    /// Output used once the one-shot queue for a program is empty.
    fallback: HashMap<String, CommandOutput>,
    /// Targets of successful `mount` calls not yet unmounted.
    mounted: BTreeSet<PathBuf>,
    /// Images with live `kpartx -a` mappings.
    attached: BTreeSet<PathBuf>,
}

/// Fake HAL implementation that records invocations without executing them.
///
/// Unscripted programs succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeHalState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a one-shot output for the next call of `program`.
    pub fn push_output(&self, program: &str, output: CommandOutput) {
        self.state()
            .scripted
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Output for every call of `program` once its queue is drained.
    pub fn set_fallback(&self, program: &str, output: CommandOutput) {
        self.state()
            .fallback
            .insert(program.to_string(), output);
    }

    /// Get all recorded invocations.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state().invocations.clone()
    }

    /// Recorded invocations rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.state()
            .invocations
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    /// Number of recorded calls of `program`.
    pub fn count(&self, program: &str) -> usize {
        self.state()
            .invocations
            .iter()
            .filter(|inv| inv.program == program)
            .count()
    }

    pub fn has_invocation(&self, check: impl Fn(&Invocation) -> bool) -> bool {
        self.state().invocations.iter().any(check)
    }

    /// Mount targets that are currently mounted.
    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        self.state().mounted.iter().cloned().collect()
    }

    /// Images that are currently mapped.
    pub fn attached_images(&self) -> Vec<PathBuf> {
        self.state().attached.iter().cloned().collect()
    }

    /// Clear recorded invocations and simulated state; scripts are kept.
    pub fn clear(&self) {
        let mut state = self.state();
        state.invocations.clear();
        state.mounted.clear();
        state.attached.clear();
    }
}

fn last_arg(invocation: &Invocation) -> Option<PathBuf> {
    invocation.args.last().map(PathBuf::from)
}

impl ProcessOps for FakeHal {
    fn execute(&self, invocation: &Invocation) -> HalResult<CommandOutput> {
        log::info!("FAKE HAL: {}", invocation);

        let mut state = self.state();
        state.invocations.push(invocation.clone());
        let scripted = state
            .scripted
            .get_mut(&invocation.program)
            .and_then(VecDeque::pop_front);
        let output = scripted
            .or_else(|| state.fallback.get(&invocation.program).cloned())
            .unwrap_or_else(CommandOutput::success);

        if output.succeeded() {
            match invocation.program.as_str() {
                "mount" => {
                    if let Some(target) = last_arg(invocation) {
                        state.mounted.insert(target);
                    }
                }
                "umount" => {
                    if let Some(target) = last_arg(invocation) {
                        state.mounted.remove(&target);
                    }
                }
                "kpartx" => {
                    if let Some(image) = last_arg(invocation) {
                        if invocation.args.iter().any(|a| a == "-a") {
                            state.attached.insert(image);
                        } else if invocation.args.iter().any(|a| a == "-d") {
                            state.attached.remove(&image);
                        }
                    }
                }
                _ => {}
            }
        }
        drop(state);

        output.check(invocation)
    }
}
