//! Scripted code generator for testing.

use crate::providers::{CodeGenerator, RandomCodeGenerator};
use crate::state::{InviteCode, PairId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Code generator that replays scripted invite codes.
///
/// Once the script is exhausted it falls back to random codes. Pair ids are
/// sequential: `pair-1`, `pair-2`, ...
#[derive(Debug, Clone, Default)]
pub struct ScriptedCodeGenerator {
    script: Arc<Mutex<VecDeque<InviteCode>>>,
    pairs: Arc<AtomicUsize>,
}

impl ScriptedCodeGenerator {
    /// Create a generator with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator that yields `codes` in order.
    #[must_use]
    pub fn with_codes(codes: impl IntoIterator<Item = InviteCode>) -> Self {
        Self {
            script: Arc::new(Mutex::new(codes.into_iter().collect())),
            pairs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Append a code to the script.
    pub fn push(&self, code: InviteCode) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(code);
        }
    }
}

impl CodeGenerator for ScriptedCodeGenerator {
    fn invite_code(&self) -> InviteCode {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(RandomCodeGenerator::random_code)
    }

    fn pair_id(&self) -> PairId {
        let n = self.pairs.fetch_add(1, Ordering::SeqCst) + 1;
        PairId::new(format!("pair-{n}"))
    }
}
