//! Model source and download logic.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{HuginnError, Result};

/// Prefix marking a Hugging Face Hub file in configuration strings.
pub const HF_PREFIX: &str = "hf://";

/// Where a model file lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelSource {
    /// A file in a HuggingFace Hub repository.
    HuggingFace {
        /// Repository ID (e.g., "onnxmodelzoo/emotion-ferplus-8").
        repo_id: String,
        /// File within the repo.
        file: String,
    },

    /// A local file.
    Local { path: PathBuf },
}

impl ModelSource {
    /// Create a HuggingFace source.
    pub fn huggingface(repo_id: impl Into<String>, file: impl Into<String>) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.into(),
            file: file.into(),
        }
    }

    /// Create a local source.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Key identifying this source in the model cache.
    pub fn cache_key(&self) -> String {
        match self {
            Self::HuggingFace { repo_id, file } => format!("hf:{repo_id}/{file}"),
            Self::Local { path } => format!("local:{}", path.display()),
        }
    }

    /// Download or resolve the model to a local path.
    ///
    /// HuggingFace files are downloaded into `cache_dir` on first use.
    pub fn resolve(&self, cache_dir: &Path) -> Result<PathBuf> {
        match self {
            Self::HuggingFace { repo_id, file } => {
                let api = hf_hub::api::sync::ApiBuilder::new()
                    .with_cache_dir(cache_dir.to_path_buf())
                    .build()
                    .map_err(|e| {
                        HuginnError::Configuration(format!("Failed to initialize HF API: {e}"))
                    })?;

                api.model(repo_id.clone()).get(file).map_err(|e| {
                    HuginnError::Configuration(format!(
                        "Failed to download {file} from {repo_id}: {e}"
                    ))
                })
            }
            Self::Local { path } => {
                if !path.exists() {
                    return Err(HuginnError::Configuration(format!(
                        "Local model path does not exist: {}",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HuggingFace { repo_id, file } => write!(f, "{HF_PREFIX}{repo_id}/{file}"),
            Self::Local { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Parses `hf://<owner>/<repo>/<path/in/repo>` or a local path.
impl FromStr for ModelSource {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        let Some(rest) = s.strip_prefix(HF_PREFIX) else {
            return Ok(Self::local(s));
        };
        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), Some(file))
                if !owner.is_empty() && !repo.is_empty() && !file.is_empty() =>
            {
                Ok(Self::huggingface(format!("{owner}/{repo}"), file))
            }
            _ => Err(HuginnError::Configuration(format!(
                "expected {HF_PREFIX}<owner>/<repo>/<file>, got '{s}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hub_and_local_sources() {
        let hub: ModelSource = "hf://onnx/emotion/model/emotion.onnx".parse().unwrap();
        assert_eq!(
            hub,
            ModelSource::huggingface("onnx/emotion", "model/emotion.onnx")
        );
        assert_eq!(hub.to_string(), "hf://onnx/emotion/model/emotion.onnx");

        let local: ModelSource = "models/face.onnx".parse().unwrap();
        assert_eq!(local, ModelSource::local("models/face.onnx"));

        assert!("hf://only-owner".parse::<ModelSource>().is_err());
    }

    #[test]
    fn missing_local_file_is_configuration_error() {
        let err = ModelSource::local("/definitely/not/here.onnx")
            .resolve(Path::new("/tmp"))
            .unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }
}
