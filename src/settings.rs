//! Runtime settings
//!
//! Persisted in LocalStorage on the web, overridable from the page URL.
//! The native binary takes the same knobs from the command line.

use serde::{Deserialize, Serialize};

use crate::consts;
use crate::renderer::vertex::colors;
use crate::sim::{Demo, StepIterations};
use crate::strategy::ExecutionStrategyKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where the simulation runs
    pub strategy: ExecutionStrategyKind,
    /// Demo shown first
    pub initial_demo: Demo,
    /// Frame-rate cap; the simulation never advances more than
    /// `1 / frame_limit` seconds per tick
    pub frame_limit: u32,
    pub iterations: StepIterations,
    /// Background, straight RGBA
    pub clear_color: [f32; 4],
    /// Script the offloaded strategy starts as a module worker
    pub worker_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategyKind::default(),
            initial_demo: Demo::default(),
            frame_limit: consts::DEFAULT_FRAME_LIMIT,
            iterations: StepIterations::default(),
            clear_color: colors::BACKGROUND,
            worker_url: consts::DEFAULT_WORKER_URL.to_string(),
        }
    }
}

impl Settings {
    /// Seconds the simulation may advance in one tick
    pub fn max_step_seconds(&self) -> f32 {
        1.0 / self.frame_limit.max(1) as f32
    }

    /// Apply one `key=value` override from the page URL.
    /// Returns false if the key is unknown or the value does not parse.
    pub fn apply_override(&mut self, key: &str, value: &str) -> bool {
        match key {
            "strategy" => match ExecutionStrategyKind::from_str(value) {
                Some(kind) => self.strategy = kind,
                None => return false,
            },
            "demo" => match Demo::from_str(value) {
                Some(demo) => self.initial_demo = demo,
                None => return false,
            },
            "frame-limit" | "frameLimit" => match value.parse::<u32>() {
                Ok(limit) if limit > 0 => self.frame_limit = limit,
                _ => return false,
            },
            _ => return false,
        }
        true
    }

    /// LocalStorage key
    const STORAGE_KEY: &'static str = "offscreen_sim_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(settings) = serde_json::from_str(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings;
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Stored settings with `?strategy=main|worker&demo=<id>` applied
    #[cfg(target_arch = "wasm32")]
    pub fn load_with_query() -> Self {
        let mut settings = Self::load();
        let search = web_sys::window()
            .and_then(|w| w.location().search().ok())
            .unwrap_or_default();
        if let Ok(params) = web_sys::UrlSearchParams::new_with_str(&search) {
            for key in ["strategy", "demo", "frameLimit"] {
                if let Some(value) = params.get(key) {
                    if !settings.apply_override(key, &value) {
                        log::warn!("ignoring query parameter {}={}", key, value);
                    }
                }
            }
        }
        settings
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.strategy, ExecutionStrategyKind::OffloadToWorker);
        assert_eq!(settings.initial_demo, Demo::WaveMachine);
        assert!((settings.max_step_seconds() - 1.0 / 60.0).abs() < 1e-9);
        assert_eq!(settings.iterations.particle, 3);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"strategy":"runOnMainThread"}"#).unwrap();
        assert_eq!(settings.strategy, ExecutionStrategyKind::RunOnMainThread);
        assert_eq!(settings.frame_limit, 60);
    }

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        assert!(settings.apply_override("strategy", "main"));
        assert!(settings.apply_override("demo", "damBreak"));
        assert!(!settings.apply_override("demo", "pong"));
        assert!(!settings.apply_override("frame-limit", "0"));
        assert_eq!(settings.strategy, ExecutionStrategyKind::RunOnMainThread);
        assert_eq!(settings.initial_demo, Demo::DamBreak);
    }
}
