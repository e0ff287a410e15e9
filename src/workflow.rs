use std::sync::Arc;
use tracing::{info, warn};

use crate::api::VocabularySource;
use crate::config::Config;
use crate::dom::Document;
use crate::error::Result;
use crate::refresh::{Clock, RefreshCoordinator, RefreshOutcome, RefreshTrigger, SkipReason};
use crate::storage::{StateStore, StoredState};
use crate::substitute::SubstitutionEngine;
use crate::ui::{validate_api_key, UserInterface};
use crate::vocab::VocabMap;

/// What a substitution run ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Markers were inserted using the given vocabulary
    Substituted { markers: usize, refreshed: bool },
    /// A refresh was needed but did not happen
    RefreshSkipped(SkipReason),
    /// `on_page_load` with auto-run turned off
    AutoRunDisabled,
}

/// One session: owns the refresh coordinator and substitution engine and
/// exposes the operations the menu surface triggers.
pub struct Workflow {
    store: Arc<dyn StateStore>,
    ui: Arc<dyn UserInterface>,
    coordinator: RefreshCoordinator,
    engine: SubstitutionEngine,
}

impl Workflow {
    pub fn new(
        config: Config,
        source: Arc<dyn VocabularySource>,
        store: Arc<dyn StateStore>,
        ui: Arc<dyn UserInterface>,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            source,
            store.clone(),
            ui.clone(),
            config.refresh,
        );
        let engine = SubstitutionEngine::new(config.substitution);

        Self {
            store,
            ui,
            coordinator,
            engine,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.coordinator = self.coordinator.with_clock(clock);
        self
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn state(&self) -> Result<StoredState> {
        StoredState::load(self.store.as_ref())
    }

    /// Return the stored API key, prompting for one if none is stored yet.
    /// `None` means the user cancelled.
    pub fn ensure_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.state()?.api_key {
            return Ok(Some(key));
        }
        self.prompt_for_api_key()
    }

    /// Ask for a new key until a valid one is entered or the prompt is
    /// cancelled. A valid key is stored and forces a refresh on the next run.
    pub fn set_api_key(&self) -> Result<Option<String>> {
        self.prompt_for_api_key()
    }

    /// Store a key supplied without prompting
    pub fn set_api_key_value(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        validate_api_key(api_key)?;
        self.store_api_key(api_key)
    }

    fn prompt_for_api_key(&self) -> Result<Option<String>> {
        loop {
            let Some(candidate) = self.ui.prompt("Please enter your API key") else {
                info!("API key entry cancelled");
                return Ok(None);
            };

            match validate_api_key(&candidate) {
                Ok(()) => {
                    self.store_api_key(&candidate)?;
                    return Ok(Some(candidate));
                }
                Err(_) => self.ui.alert("That was not a valid API key, please try again"),
            }
        }
    }

    fn store_api_key(&self, api_key: &str) -> Result<()> {
        StoredState::save_api_key(self.store.as_ref(), api_key)?;
        StoredState::save_force_refresh(self.store.as_ref(), true)?;
        info!("API key stored, vocabulary will be refreshed on the next run");
        Ok(())
    }

    pub fn set_auto_run(&self, enabled: bool) -> Result<()> {
        StoredState::save_auto_run(self.store.as_ref(), enabled)?;
        info!("Auto-run {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Manual refresh from the menu; always reports the result. Asks for
    /// the API key first when none is stored.
    pub async fn refresh_vocabulary(&self) -> Result<RefreshOutcome> {
        if self.ensure_api_key()?.is_none() {
            return Ok(RefreshOutcome::Skipped(SkipReason::MissingApiKey));
        }
        self.coordinator.refresh(RefreshTrigger::Manual).await
    }

    /// Replace vocabulary in `document`, refreshing it first when due.
    /// Asks for the API key first when none is stored.
    pub async fn run_now(&self, document: &mut Document, force_refresh: bool) -> Result<RunOutcome> {
        // a lock from an earlier, abandoned run is not trusted
        self.coordinator.reset_lock();

        if self.ensure_api_key()?.is_none() {
            return Ok(RunOutcome::RefreshSkipped(SkipReason::MissingApiKey));
        }
        self.run(document, force_refresh).await
    }

    async fn run(&self, document: &mut Document, force_refresh: bool) -> Result<RunOutcome> {
        if self.coordinator.decide_refresh(force_refresh)? {
            let outcome = self.coordinator.refresh(RefreshTrigger::Chained).await?;
            return Ok(match outcome {
                RefreshOutcome::Skipped(reason) => RunOutcome::RefreshSkipped(reason),
                RefreshOutcome::Updated(map) | RefreshOutcome::Unchanged(map) => {
                    let markers = self.engine.substitute(document, &map);
                    RunOutcome::Substituted { markers, refreshed: true }
                }
            });
        }

        let map = self.load_vocab()?;
        let markers = self.engine.substitute(document, &map);
        Ok(RunOutcome::Substituted { markers, refreshed: false })
    }

    /// Page-load hook: runs without prompting when auto-run is on
    pub async fn on_page_load(&self, document: &mut Document) -> Result<RunOutcome> {
        if !self.state()?.auto_run {
            return Ok(RunOutcome::AutoRunDisabled);
        }
        self.coordinator.reset_lock();
        self.run(document, false).await
    }

    /// Load the stored vocabulary. A corrupt value is reported and wiped so
    /// the next run downloads it again.
    pub fn load_vocab(&self) -> Result<VocabMap> {
        let raw = self.state()?.vocab.unwrap_or_default();
        match VocabMap::from_stored(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!("Discarding stored vocabulary: {}", e);
                self.ui.alert("Error while parsing the vocab list; deleting it now. Please try again.");
                StoredState::clear_vocab(self.store.as_ref())?;
                Err(e)
            }
        }
    }

    /// Look a phrase up in the stored vocabulary
    pub fn lookup(&self, phrase: &str) -> Result<Option<String>> {
        let raw = self.state()?.vocab.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(VocabMap::from_stored(&raw)?.lookup(phrase).map(str::to_string))
    }

    /// Forget the stored vocabulary and refresh bookkeeping
    pub fn clear_vocab(&self) -> Result<()> {
        StoredState::clear_all_vocab_data(self.store.as_ref())?;
        info!("Stored vocabulary cleared");
        Ok(())
    }

    /// Toggle a marker between translation and original, as a click would.
    /// Returns whether the translation is now displayed.
    pub fn toggle_marker(&self, document: &mut Document, id: ego_tree::NodeId) -> Option<bool> {
        document
            .toggle_marker(id, self.engine.marker_class())
            .map(|marker| marker.showing_translation)
    }
}
