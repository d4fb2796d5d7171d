use std::io;

use crate::prefs::PreferenceStore;

/// Where the launch happens, as far as the legal prompt cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptContext {
    pub should_daemonize: bool,
    pub stdin_is_terminal: bool,
    pub stdout_is_terminal: bool,
}

impl PromptContext {
    pub fn detect(should_daemonize: bool) -> Self {
        Self {
            should_daemonize,
            stdin_is_terminal: crate::daemon::is_terminal(libc::STDIN_FILENO),
            stdout_is_terminal: crate::daemon::is_terminal(libc::STDOUT_FILENO),
        }
    }

    /// Nobody is there to answer: daemon mode, or stdio redirected.
    pub fn is_headless(&self) -> bool {
        self.should_daemonize || !(self.stdin_is_terminal && self.stdout_is_terminal)
    }
}

pub struct LegalAcceptanceGate<'a> {
    store: &'a PreferenceStore,
}

impl<'a> LegalAcceptanceGate<'a> {
    pub fn new(store: &'a PreferenceStore) -> Self {
        Self { store }
    }

    pub fn has_accepted(&self) -> bool {
        self.store.has_accepted_legal_notice()
    }

    pub fn record_accepted(&self) -> anyhow::Result<()> {
        self.store.set_accepted_legal_notice()
    }

    /// `true` when startup may continue.
    ///
    /// The console build never blocks a headless launch on the prompt (and
    /// does not record acceptance for it); the interactive-UI build always
    /// asks until accepted once.
    pub fn check(
        &self,
        ctx: PromptContext,
        prompt: impl FnOnce() -> io::Result<bool>,
    ) -> anyhow::Result<bool> {
        if !cfg!(feature = "interactive-ui") && ctx.is_headless() {
            log::debug!("legal: headless launch, prompt skipped");
            return Ok(true);
        }
        if self.has_accepted() {
            return Ok(true);
        }
        let agreed = prompt()?;
        if agreed {
            self.record_accepted()?;
        }
        Ok(agreed)
    }
}
