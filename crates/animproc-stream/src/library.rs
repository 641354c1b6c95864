//! Animation library - canned animations by name

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use animproc_core::{AnimError, AnimResult};

use crate::animation::{Animation, AnimationDefinition};

/// Source of canned animations
pub trait AnimationLibrary: Send {
    fn canned_animation(&self, name: &str) -> Option<Arc<Animation>>;

    /// Load an animation file, replacing any animation of the same name.
    /// Returns the loaded names.
    fn load_animation_file(&mut self, path: &Path) -> AnimResult<Vec<String>>;
}

/// Animations held in memory, loaded from JSON files
#[derive(Default)]
pub struct InMemoryLibrary {
    animations: HashMap<String, Arc<Animation>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, animation: Animation) {
        self.animations
            .insert(animation.name().to_string(), Arc::new(animation));
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    /// Parse a JSON document holding one animation or a list of them
    pub fn load_json(&mut self, json: &str) -> AnimResult<Vec<String>> {
        let defs: Vec<AnimationDefinition> = match serde_json::from_str(json) {
            Ok(defs) => defs,
            Err(_) => vec![serde_json::from_str(json)
                .map_err(|e| AnimError::InvalidWireFormat(e.to_string()))?],
        };

        let mut names = Vec::with_capacity(defs.len());
        for def in defs {
            if def.name.is_empty() {
                return Err(AnimError::InvalidWireFormat("animation without a name".into()));
            }
            let anim = Animation::try_from(def)?;
            names.push(anim.name().to_string());
            self.insert(anim);
        }
        Ok(names)
    }

    /// Load every `.json` file in `dir`. Bad files are logged and skipped.
    pub fn load_dir(&mut self, dir: &Path) -> AnimResult<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| AnimError::AnimationFile {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                match self.load_animation_file(&path) {
                    Ok(names) => loaded += names.len(),
                    Err(e) => tracing::warn!("skipping animation file: {}", e),
                }
            }
        }
        tracing::info!(dir = %dir.display(), loaded, "animations loaded");
        Ok(loaded)
    }
}

impl AnimationLibrary for InMemoryLibrary {
    fn canned_animation(&self, name: &str) -> Option<Arc<Animation>> {
        self.animations.get(name).cloned()
    }

    fn load_animation_file(&mut self, path: &Path) -> AnimResult<Vec<String>> {
        let file_err = |reason: String| AnimError::AnimationFile {
            path: path.display().to_string(),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        self.load_json(&json).map_err(|e| file_err(e.to_string()))
    }
}
