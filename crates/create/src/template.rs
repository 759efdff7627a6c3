//! Pod template loading.
//!
//! A template is one pod object in YAML or JSON (JSON parses as YAML).

use std::path::Path;

use schedbench_core::Pod;
use tracing::debug;

use crate::error::TemplateError;

/// Decode a template from text. The caller supplies path context.
pub fn parse_template(text: &str) -> Result<Pod, String> {
    serde_yaml::from_str(text).map_err(|e| e.to_string())
}

/// Read the pod template at `path`. The template must carry a name.
pub fn load_template(path: &Path) -> Result<Pod, TemplateError> {
    let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let pod = parse_template(&text).map_err(|message| TemplateError::Decode {
        path: path.to_path_buf(),
        message,
    })?;

    if pod.name().is_empty() {
        return Err(TemplateError::MissingName(path.to_path_buf()));
    }

    debug!(path = %path.display(), name = pod.name(), namespace = pod.namespace(), "Loaded pod template");
    Ok(pod)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: probe-\n  namespace: bench\nspec:\n  containers:\n  - name: c\n    image: pause\n",
        );
        let pod = load_template(file.path()).unwrap();
        assert_eq!(pod.name(), "probe-");
        assert_eq!(pod.namespace(), "bench");
        assert_eq!(pod.spec["containers"][0]["image"], "pause");
    }

    #[test]
    fn test_load_json() {
        let file = write_temp(r#"{"apiVersion":"v1","kind":"Pod","metadata":{"name":"probe"},"spec":{}}"#);
        let pod = load_template(file.path()).unwrap();
        assert_eq!(pod.name(), "probe");
        assert_eq!(pod.namespace(), "default");
    }

    #[test]
    fn test_missing_name_rejected() {
        let file = write_temp("apiVersion: v1\nkind: Pod\nmetadata: {}\n");
        let err = load_template(file.path()).unwrap_err();
        assert!(matches!(err, TemplateError::MissingName(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let file = write_temp("metadata: [unclosed");
        let err = load_template(file.path()).unwrap_err();
        assert!(matches!(err, TemplateError::Decode { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_template(Path::new("/nonexistent/pod.yaml")).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
