//! Translation between chord text and the physical keys of the current layout.
//!
//! Chord text names keys by their US-layout meaning: `ctrl+z` means "Ctrl and
//! the key that types `z`". On a German keyboard that key is `KeyY`, so the
//! chord is resolved against the detected layout before matching.

use super::data::{KeyboardLayoutData, NativeKeyboardLayout};
use super::provider::{KeyboardLayoutProvider, LayoutChoice};
use super::tester::KeyValidationInput;
use crate::binding::KeyCode;
use crate::event::{Emitter, Subscription};
use crate::keys::Key;
use crate::platform::Platform;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::debug;

/// A native layout prepared for chord resolution.
#[derive(Debug, Clone, Default)]
pub struct KeyboardLayout {
    /// `(US key code, shift)` to the chord producing the same character.
    key_to_key_code: HashMap<(&'static str, bool), KeyCode>,
    /// Physical code to the character it types without modifiers.
    code_to_character: HashMap<String, String>,
}

impl KeyboardLayout {
    pub fn from_native(native: &NativeKeyboardLayout) -> Self {
        let mut layout = Self::default();
        for (code, mapping) in &native.mapping {
            if code.starts_with("Numpad") {
                continue;
            }
            let Some(key) = Key::from_code(code) else {
                continue;
            };
            layout.add_key_mapping(key, &mapping.value, false, false);
            layout.add_key_mapping(key, &mapping.with_shift, true, false);
            layout.add_key_mapping(key, &mapping.with_alt_gr, false, true);
            layout.add_key_mapping(key, &mapping.with_shift_alt_gr, true, true);
            if !mapping.value.is_empty() {
                layout.code_to_character.insert(code.clone(), mapping.value.clone());
            }
        }
        layout
    }

    // First mapping for a character wins.
    fn add_key_mapping(&mut self, key: &'static Key, value: &str, shift: bool, alt: bool) {
        let mut chars = value.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return;
        };
        let Some((us_key, us_shift)) = Key::from_character(c) else {
            return;
        };
        self.key_to_key_code.entry((us_key.code, us_shift)).or_insert_with(|| KeyCode {
            key: Some(key),
            shift,
            alt,
            character: Some(value.to_string()),
            ..KeyCode::default()
        });
    }

    /// Chord producing the character of `key` (with or without Shift) on
    /// this layout.
    pub fn mapped(&self, key: &Key, shift: bool) -> Option<&KeyCode> {
        self.key_to_key_code.get(&(key.code, shift))
    }

    /// Character `code` types on this layout.
    pub fn character(&self, code: &str) -> Option<&str> {
        self.code_to_character.get(code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_key_code.is_empty()
    }
}

/// Published after the current layout changed.
#[derive(Debug, Clone)]
pub struct KeyboardLayoutChangeEvent {
    pub layout: Rc<KeyboardLayout>,
    pub data: KeyboardLayoutData,
}

struct ServiceInner {
    provider: KeyboardLayoutProvider,
    platform: Platform,
    current: RefCell<Rc<KeyboardLayout>>,
    changed: Emitter<KeyboardLayoutChangeEvent>,
    provider_listener: RefCell<Option<Subscription>>,
}

/// Resolves chords through the layout the provider currently selects.
#[derive(Clone)]
pub struct KeyboardLayoutService {
    inner: Rc<ServiceInner>,
}

impl KeyboardLayoutService {
    pub fn new(provider: KeyboardLayoutProvider) -> Self {
        let platform = provider.platform();
        Self {
            inner: Rc::new(ServiceInner {
                provider,
                platform,
                current: RefCell::new(Rc::new(KeyboardLayout::default())),
                changed: Emitter::new(),
                provider_listener: RefCell::new(None),
            }),
        }
    }

    /// Query the provider once and follow its layout changes afterwards.
    pub fn initialize(&self) {
        let native = self.inner.provider.get_native_layout();
        self.update_layout(&native);

        let weak: Weak<ServiceInner> = Rc::downgrade(&self.inner);
        let subscription = self.inner.provider.on_did_change_native_layout(move |native| {
            if let Some(inner) = weak.upgrade() {
                let service = KeyboardLayoutService { inner };
                let layout = service.update_layout(native);
                service.inner.changed.fire(&KeyboardLayoutChangeEvent {
                    layout,
                    data: service.inner.provider.current_layout_data(),
                });
            }
        });
        *self.inner.provider_listener.borrow_mut() = Some(subscription);
    }

    pub fn provider(&self) -> &KeyboardLayoutProvider {
        &self.inner.provider
    }

    pub fn current_layout(&self) -> Rc<KeyboardLayout> {
        Rc::clone(&self.inner.current.borrow())
    }

    /// Replace the current layout with one derived from `native`.
    pub fn update_layout(&self, native: &NativeKeyboardLayout) -> Rc<KeyboardLayout> {
        let layout = Rc::new(KeyboardLayout::from_native(native));
        debug!(layout = %native.info.id, "keyboard layout updated");
        *self.inner.current.borrow_mut() = Rc::clone(&layout);
        layout
    }

    /// Pin a layout or return to detection. Listeners hear about the change
    /// through [`Self::on_keyboard_layout_changed`].
    pub fn set_layout_data(&self, choice: LayoutChoice) -> KeyboardLayoutData {
        self.inner.provider.set_layout_data(choice)
    }

    pub fn on_keyboard_layout_changed(
        &self,
        listener: impl Fn(&KeyboardLayoutChangeEvent) + 'static,
    ) -> Subscription {
        self.inner.changed.subscribe(listener)
    }

    /// Map a chord written against the US layout to the physical chord that
    /// types the same character on the current layout. Chords without a
    /// mapping are returned unchanged.
    pub fn resolve_key_code(&self, input: &KeyCode) -> KeyCode {
        let layout = self.current_layout();
        if let Some(key) = input.key {
            for shift in [false, true] {
                if let Some(mapped) = layout.mapped(key, shift) {
                    if let Some(out) = self.transform_key_code(input, mapped, shift) {
                        return out;
                    }
                }
            }
        }
        input.clone()
    }

    fn transform_key_code(&self, input: &KeyCode, mapped: &KeyCode, needs_shift: bool) -> Option<KeyCode> {
        if !input.shift && needs_shift {
            return None;
        }
        // AltGr characters cannot take further modifiers.
        if mapped.alt && (input.alt || input.ctrl || (input.shift && !needs_shift)) {
            return None;
        }
        // AltGr arrives as Ctrl+Alt on PC keyboards.
        let alt_gr_ctrl = mapped.alt && self.inner.platform == Platform::Pc;
        Some(KeyCode {
            key: mapped.key,
            meta: input.meta,
            ctrl: input.ctrl || alt_gr_ctrl,
            shift: (input.shift && !needs_shift) || mapped.shift,
            alt: input.alt || mapped.alt,
            character: mapped.character.clone(),
        })
    }

    /// Character shown for `key` on the current layout, falling back to its
    /// chord-text token.
    pub fn get_keyboard_character(&self, key: &Key) -> String {
        let layout = self.current_layout();
        match layout.character(key.code) {
            Some(c) if !c.trim_matches(['\n', '\r', '\t']).is_empty() => c.to_string(),
            _ => key.easy_string.to_string(),
        }
    }

    /// Feed an observed key press to layout detection.
    pub fn validate_key_code(&self, key_code: &KeyCode) {
        if let (Some(key), Some(character)) = (key_code.key, key_code.character.as_deref()) {
            self.inner.provider.validate_key(
                &KeyValidationInput::new(key.code, character)
                    .with_shift(key_code.shift)
                    .with_alt(key_code.alt),
            );
        }
    }
}

impl std::fmt::Debug for KeyboardLayoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyboardLayoutService")
            .field("provider", &self.inner.provider)
            .finish()
    }
}
