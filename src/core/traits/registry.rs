use crate::core::domain::LanguageScripts;

/// Resolves a language name to its build and run scripts.
#[mockall::automock]
pub trait LanguageRegistry: std::fmt::Debug + Send + Sync {
    fn scripts(&self, language: &str) -> Option<LanguageScripts>;

    fn languages(&self) -> Vec<String>;
}
