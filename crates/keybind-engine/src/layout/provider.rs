//! Detection of the keyboard layout in use.
//!
//! Three sources feed the current layout, strongest first: an explicit user
//! choice, a native layout query, and inference from pressed keys.

use super::builtin::{self, BuiltinLayout};
use super::data::{KeyboardLayoutData, NativeKeyboardLayout};
use super::tester::{KeyValidationInput, KeyboardTester, KeyboardTesterState};
use super::LayoutError;
use crate::event::{Emitter, Subscription};
use crate::platform::{self, Platform};
use crate::storage::{StateStorage, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};

/// Storage key of the persisted provider state.
pub const STORAGE_KEY: &str = "keyboard";

/// Where the current layout came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyboardLayoutSource {
    #[serde(rename = "navigator.keyboard")]
    NativeApi,
    #[serde(rename = "user-choice")]
    UserChoice,
    #[serde(rename = "pressed-keys")]
    PressedKeys,
}

impl fmt::Display for KeyboardLayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NativeApi => write!(f, "native API"),
            Self::UserChoice => write!(f, "user choice"),
            Self::PressedKeys => write!(f, "pressed keys"),
        }
    }
}

/// Host query for the active layout.
pub trait NativeLayoutSource {
    fn query(&self) -> Result<NativeKeyboardLayout, LayoutError>;
}

/// Argument of [`KeyboardLayoutProvider::set_layout_data`].
#[derive(Debug, Clone)]
pub enum LayoutChoice {
    Autodetect,
    Layout(KeyboardLayoutData),
}

/// Persisted provider state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutProviderState {
    pub tester: Option<KeyboardTesterState>,
    pub source: Option<KeyboardLayoutSource>,
    pub current_layout: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Construction parameters of a [`KeyboardLayoutProvider`].
pub struct ProviderOptions {
    pub platform: Platform,
    /// BCP 47 locale used to break ties between candidates.
    pub locale: Option<String>,
    pub native: Option<Box<dyn NativeLayoutSource>>,
    /// Where detection state is saved and restored. `None` disables it.
    pub storage: Option<Rc<dyn StateStorage>>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            locale: platform::environment_locale(),
            native: None,
            storage: None,
        }
    }
}

struct ProviderState {
    layouts: Vec<KeyboardLayoutData>,
    tester: KeyboardTester,
    source: KeyboardLayoutSource,
    current: KeyboardLayoutData,
}

struct ProviderInner {
    state: RefCell<ProviderState>,
    platform: Platform,
    locale: Option<String>,
    native: Option<Box<dyn NativeLayoutSource>>,
    storage: Option<Rc<dyn StateStorage>>,
    changed: Emitter<Rc<NativeKeyboardLayout>>,
}

/// Keeps the candidate layouts, scores them and selects the current one.
#[derive(Clone)]
pub struct KeyboardLayoutProvider {
    inner: Rc<ProviderInner>,
}

impl KeyboardLayoutProvider {
    pub fn new(options: ProviderOptions) -> Self {
        let layouts: Vec<KeyboardLayoutData> =
            BuiltinLayout::STARTUP.iter().map(|l| l.data()).collect();
        let provider = Self {
            inner: Rc::new(ProviderInner {
                state: RefCell::new(ProviderState {
                    tester: KeyboardTester::new(layouts.clone()),
                    layouts,
                    source: KeyboardLayoutSource::PressedKeys,
                    current: KeyboardLayoutData::fallback(options.platform),
                }),
                platform: options.platform,
                locale: options.locale,
                native: options.native,
                storage: options.storage,
                changed: Emitter::new(),
            }),
        };
        provider.load_state();
        provider
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    /// Make a built-in layout a candidate. Rebuilds the tester.
    pub fn add_layout(&self, id: &str) -> Result<(), LayoutError> {
        if self.has_layout(id) {
            return Ok(());
        }
        let layout = builtin::load_layout(id)?;
        self.add_layout_data(layout);
        Ok(())
    }

    /// Make `layout` a candidate. Rebuilds the tester.
    pub fn add_layout_data(&self, layout: KeyboardLayoutData) {
        let mut state = self.inner.state.borrow_mut();
        let id = layout.id();
        if state.layouts.iter().any(|l| l.id() == id) {
            return;
        }
        debug!(layout = %id, "added keyboard layout candidate");
        state.layouts.push(layout);
        state.tester = KeyboardTester::new(state.layouts.clone());
    }

    fn has_layout(&self, id: &str) -> bool {
        self.inner.state.borrow().layouts.iter().any(|l| l.id() == id)
    }

    pub fn all_layout_data(&self) -> Vec<KeyboardLayoutData> {
        self.inner.state.borrow().tester.candidates().to_vec()
    }

    pub fn current_layout_data(&self) -> KeyboardLayoutData {
        self.inner.state.borrow().current.clone()
    }

    pub fn current_layout_source(&self) -> KeyboardLayoutSource {
        self.inner.state.borrow().source
    }

    /// Snapshot of the tester, for inspection.
    pub fn tester_state(&self) -> KeyboardTesterState {
        self.inner.state.borrow().tester.get_state()
    }

    /// Listen for changes of the selected native layout.
    pub fn on_did_change_native_layout(
        &self,
        listener: impl Fn(&Rc<NativeKeyboardLayout>) + 'static,
    ) -> Subscription {
        self.inner.changed.subscribe(listener)
    }

    /// Mapping of the current layout, re-detecting unless the user chose one.
    pub fn get_native_layout(&self) -> Rc<NativeKeyboardLayout> {
        if self.current_layout_source() == KeyboardLayoutSource::UserChoice {
            return Rc::clone(&self.inner.state.borrow().current.raw);
        }
        let (layout, source) = self.autodetect();
        let raw = Rc::clone(&layout.raw);
        self.set_current(&mut self.inner.state.borrow_mut(), layout, source);
        raw
    }

    /// Host reported a layout switch.
    pub fn native_layout_changed(&self) {
        let raw = self.get_native_layout();
        self.inner.changed.fire(&raw);
    }

    /// Pin a layout, or go back to automatic detection.
    pub fn set_layout_data(&self, choice: LayoutChoice) -> KeyboardLayoutData {
        match choice {
            LayoutChoice::Autodetect => {
                if self.current_layout_source() != KeyboardLayoutSource::UserChoice {
                    return self.current_layout_data();
                }
                let (layout, source) = self.autodetect();
                self.set_current(&mut self.inner.state.borrow_mut(), layout.clone(), source);
                self.inner.changed.fire(&layout.raw);
                layout
            }
            LayoutChoice::Layout(layout) => {
                let unchanged = {
                    let state = self.inner.state.borrow();
                    state.source == KeyboardLayoutSource::UserChoice && state.current == layout
                };
                if !unchanged {
                    self.set_current(
                        &mut self.inner.state.borrow_mut(),
                        layout.clone(),
                        KeyboardLayoutSource::UserChoice,
                    );
                    self.inner.changed.fire(&layout.raw);
                }
                layout
            }
        }
    }

    /// Score an observed key press. Fires when the best layout changes.
    pub fn validate_key(&self, input: &KeyValidationInput) {
        let selected = {
            let mut state = self.inner.state.borrow_mut();
            if state.source != KeyboardLayoutSource::PressedKeys {
                return;
            }
            if !state.tester.update_scores(input) {
                return;
            }
            let layout = self.select_layout(&state);
            if layout == state.current || layout.is_fallback() {
                return;
            }
            self.set_current(&mut state, layout.clone(), KeyboardLayoutSource::PressedKeys);
            layout
        };
        self.inner.changed.fire(&selected.raw);
    }

    fn set_current(&self, state: &mut ProviderState, layout: KeyboardLayoutData, source: KeyboardLayoutSource) {
        if state.tester.input_count() > 0
            && matches!(source, KeyboardLayoutSource::PressedKeys | KeyboardLayoutSource::NativeApi)
        {
            info!(
                source = %source,
                layout = %layout.name,
                hardware = %layout.hardware,
                "detected keyboard layout"
            );
        }
        state.current = layout;
        state.source = source;
        self.save_state(state);
    }

    fn autodetect(&self) -> (KeyboardLayoutData, KeyboardLayoutSource) {
        let native = self.inner.native.as_ref().and_then(|source| match source.query() {
            Ok(layout) => Some(layout),
            Err(e) => {
                debug!(error = %e, "native keyboard layout unavailable");
                None
            }
        });

        let mut state = self.inner.state.borrow_mut();
        match native {
            Some(layout) => {
                state.tester.reset();
                for (code, mapping) in &layout.mapping {
                    if !mapping.value.is_empty() {
                        state
                            .tester
                            .update_scores(&KeyValidationInput::new(code.as_str(), mapping.value.as_str()));
                    }
                }
                (self.select_layout(&state), KeyboardLayoutSource::NativeApi)
            }
            None => (self.select_layout(&state), KeyboardLayoutSource::PressedKeys),
        }
    }

    /// Best candidate at the top score: matching hardware and locale
    /// language, then matching hardware, then any.
    fn select_layout(&self, state: &ProviderState) -> KeyboardLayoutData {
        let top = state.tester.top_score();
        let tied: Vec<&KeyboardLayoutData> = state
            .tester
            .candidates()
            .iter()
            .zip(state.tester.scores())
            .filter(|(_, score)| **score == top)
            .map(|(candidate, _)| candidate)
            .collect();

        let platform = self.inner.platform;
        let language_matches = |candidate: &KeyboardLayoutData| {
            self.inner
                .locale
                .as_deref()
                .is_some_and(|locale| locale.starts_with(&candidate.language))
        };

        tied.iter()
            .find(|c| c.hardware == platform && language_matches(c))
            .or_else(|| tied.iter().find(|c| c.hardware == platform))
            .or_else(|| tied.first())
            .map(|c| (*c).clone())
            .unwrap_or_else(|| KeyboardLayoutData::fallback(platform))
    }

    fn save_state(&self, state: &ProviderState) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        let saved = LayoutProviderState {
            tester: Some(state.tester.get_state()),
            source: Some(state.source),
            current_layout: (!state.current.is_fallback()).then(|| state.current.id()),
            saved_at: Some(Utc::now()),
        };
        let result = serde_json::to_value(&saved)
            .map_err(StorageError::from)
            .and_then(|value| storage.set_data(STORAGE_KEY, value));
        if let Err(e) = result {
            debug!(error = %e, "failed to save keyboard layout state");
        }
    }

    fn load_state(&self) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        let saved: LayoutProviderState = match storage.get_data(STORAGE_KEY) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(saved) => saved,
                Err(e) => {
                    debug!(error = %e, "ignoring malformed keyboard layout state");
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "failed to load keyboard layout state");
                return;
            }
        };

        // Saved scores may name built-in layouts loaded lazily last time.
        let tester = saved.tester.unwrap_or_default();
        for id in tester.scores.keys().chain(saved.current_layout.iter()) {
            if !self.has_layout(id) && BuiltinLayout::from_id(id).is_some() {
                if let Err(e) = self.add_layout(id) {
                    debug!(layout = %id, error = %e, "failed to restore keyboard layout");
                }
            }
        }

        let mut state = self.inner.state.borrow_mut();
        state.tester.set_state(&tester);
        state.source = saved.source.unwrap_or(KeyboardLayoutSource::PressedKeys);
        let current = saved
            .current_layout
            .and_then(|id| state.tester.candidates().iter().find(|c| c.id() == id).cloned())
            .unwrap_or_else(|| KeyboardLayoutData::fallback(self.inner.platform));
        state.current = current;
        debug!(layout = %state.current.id(), source = %state.source, "restored keyboard layout state");
    }
}

impl fmt::Debug for KeyboardLayoutProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("KeyboardLayoutProvider")
            .field("current", &state.current.id())
            .field("source", &state.source)
            .field("candidates", &state.layouts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::cell::Cell;

    fn provider(platform: Platform, locale: &str) -> KeyboardLayoutProvider {
        KeyboardLayoutProvider::new(ProviderOptions {
            platform,
            locale: Some(locale.to_string()),
            native: None,
            storage: None,
        })
    }

    fn press(provider: &KeyboardLayoutProvider, code: &str, character: &str) {
        provider.validate_key(&KeyValidationInput::new(code, character));
    }

    #[test]
    fn test_tie_break_prefers_hardware_and_language() {
        let provider = provider(Platform::Pc, "de-DE");
        provider.add_layout("de-German-mac").unwrap();
        provider.add_layout("de-German-pc").unwrap();
        assert_eq!(provider.get_native_layout().info.lang, "de");
        assert_eq!(provider.current_layout_data().id(), "de-German-pc");

        let provider = self::provider(Platform::Mac, "fr-FR");
        provider.add_layout("de-German-pc").unwrap();
        provider.get_native_layout();
        assert_eq!(provider.current_layout_data().id(), "en-US-mac");
    }

    #[test]
    fn test_pressed_keys_switch_layout() {
        let provider = provider(Platform::Pc, "en-US");
        provider.add_layout("de-German-pc").unwrap();
        let fired = Rc::new(Cell::new(0));
        let count = fired.clone();
        let _sub = provider.on_did_change_native_layout(move |_| count.set(count.get() + 1));

        press(&provider, "KeyZ", "y");
        assert_eq!(provider.current_layout_data().id(), "de-German-pc");
        assert_eq!(fired.get(), 1);

        press(&provider, "KeyZ", "y");
        press(&provider, "KeyA", "a");
        assert_eq!(fired.get(), 1);

        // Contradicting evidence starts over and US wins again.
        press(&provider, "KeyZ", "z");
        assert_eq!(provider.current_layout_data().id(), "en-US-pc");
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_user_choice_is_sticky() {
        let provider = provider(Platform::Pc, "en-US");
        let french = builtin::load_layout("fr-French-pc").unwrap();
        provider.set_layout_data(LayoutChoice::Layout(french.clone()));
        assert_eq!(provider.current_layout_source(), KeyboardLayoutSource::UserChoice);

        press(&provider, "KeyZ", "z");
        assert_eq!(provider.current_layout_data(), french);
        assert_eq!(provider.get_native_layout().info.lang, "fr");

        let detected = provider.set_layout_data(LayoutChoice::Autodetect);
        assert_eq!(detected.id(), "en-US-pc");
        assert_eq!(provider.current_layout_source(), KeyboardLayoutSource::PressedKeys);
    }

    struct FixedNative(Result<NativeKeyboardLayout, LayoutError>);

    impl NativeLayoutSource for FixedNative {
        fn query(&self) -> Result<NativeKeyboardLayout, LayoutError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_native_source() {
        let provider = KeyboardLayoutProvider::new(ProviderOptions {
            platform: Platform::Pc,
            locale: Some("en-US".into()),
            native: Some(Box::new(FixedNative(Ok(BuiltinLayout::DeGermanPc.load())))),
            storage: None,
        });
        provider.add_layout("de-German-pc").unwrap();
        provider.get_native_layout();
        assert_eq!(provider.current_layout_source(), KeyboardLayoutSource::NativeApi);
        assert_eq!(provider.current_layout_data().id(), "de-German-pc");

        let failing = KeyboardLayoutProvider::new(ProviderOptions {
            platform: Platform::Pc,
            locale: None,
            native: Some(Box::new(FixedNative(Err(LayoutError::NativeUnavailable)))),
            storage: None,
        });
        failing.get_native_layout();
        assert_eq!(failing.current_layout_source(), KeyboardLayoutSource::PressedKeys);
    }

    #[test]
    fn test_state_persists() {
        let storage: Rc<dyn StateStorage> = Rc::new(MemoryStorage::new());
        let options = || ProviderOptions {
            platform: Platform::Pc,
            locale: Some("en-US".into()),
            native: None,
            storage: Some(Rc::clone(&storage)),
        };

        let first = KeyboardLayoutProvider::new(options());
        first.add_layout("de-German-pc").unwrap();
        press(&first, "KeyZ", "y");
        assert_eq!(first.current_layout_data().id(), "de-German-pc");

        let second = KeyboardLayoutProvider::new(options());
        assert_eq!(second.current_layout_data().id(), "de-German-pc");
        assert_eq!(second.tester_state().top_score, 1);
        assert_eq!(second.current_layout_source(), KeyboardLayoutSource::PressedKeys);
    }
}
