use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::{domain::LanguageScripts, traits::registry::LanguageRegistry};

const BUILD_SCRIPT: &str = "build";
const RUN_SCRIPT: &str = "run";

/// Languages discovered as sub-directories of a scripts directory, each
/// holding a `build` and a `run` script. Scanned once at start-up.
#[derive(Clone, Debug, Default)]
pub struct ScriptDirectory {
    languages: BTreeMap<String, LanguageScripts>,
}

impl ScriptDirectory {
    pub fn scan<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let mut languages = BTreeMap::new();

        for entry in std::fs::read_dir(dir.as_ref())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 language directory");
                continue;
            };

            let path: PathBuf = entry.path();
            languages.insert(
                name,
                LanguageScripts {
                    build: path.join(BUILD_SCRIPT),
                    run: path.join(RUN_SCRIPT),
                },
            );
        }

        tracing::debug!("Found languages: {:?}", languages.keys().collect::<Vec<_>>());
        Ok(Self { languages })
    }
}

impl LanguageRegistry for ScriptDirectory {
    fn scripts(&self, language: &str) -> Option<LanguageScripts> {
        self.languages.get(language).cloned()
    }

    fn languages(&self) -> Vec<String> {
        self.languages.keys().cloned().collect()
    }
}
