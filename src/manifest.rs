//! WebApp manifests: multi-document YAML in, synthesized dependents out.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use webapp_core::{Gvk, Kind, Labels, ObjectMeta, Scheme, WebApp, WebAppSpec};
use webapp_reconciler::synthesize::{exposure_for, workload_for};

use crate::error::{Error, Result};

/// Namespace used when a manifest omits one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Longest allowed DNS-1123 label.
pub const MAX_NAME_LEN: usize = 63;

const DNS_LABEL: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Document {
    api_version: String,
    kind: String,
    metadata: DocumentMeta,
    spec: WebAppSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: Labels,
}

/// An object as printed by `render`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Rendered<'a, S> {
    api_version: String,
    kind: &'a str,
    metadata: &'a ObjectMeta,
    spec: &'a S,
}

impl<'a, S: Serialize> Rendered<'a, S> {
    fn new(gvk: &'a Gvk, metadata: &'a ObjectMeta, spec: &'a S) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: &gvk.kind,
            metadata,
            spec,
        }
    }
}

/// Parses and validates WebApp manifests.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    gvk: Gvk,
    name_pattern: Regex,
}

impl ManifestLoader {
    /// Create a loader accepting the WebApp kind registered in `scheme`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme does not register the WebApp kind.
    pub fn new(scheme: &Scheme) -> Result<Self> {
        let gvk = scheme.gvk(Kind::WebApp)?.clone();
        let name_pattern = Regex::new(DNS_LABEL)
            .map_err(|e| Error::invalid_config(format!("invalid name pattern: {e}")))?;
        Ok(Self { gvk, name_pattern })
    }

    /// Parse every non-empty document in `content`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Manifest` naming the 1-based document that failed to
    /// parse or validate, or that repeats an earlier identity.
    pub fn parse(&self, content: &str) -> Result<Vec<WebApp>> {
        let mut webapps = Vec::new();
        let mut seen = HashSet::new();

        for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
            let number = index.saturating_add(1);
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            let document: Document = serde_yaml::from_value(value)
                .map_err(|e| Error::manifest(number, e.to_string()))?;
            let webapp = self.admit(document).map_err(|reason| Error::manifest(number, reason))?;

            if !seen.insert(webapp.metadata.key()) {
                return Err(Error::manifest(
                    number,
                    format!("duplicate WebApp {}", webapp.metadata.key()),
                ));
            }
            webapps.push(webapp);
        }

        Ok(webapps)
    }

    /// Read and parse one manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any document is invalid.
    pub fn load_file(&self, path: &Path) -> Result<Vec<WebApp>> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.parse(&content)
    }

    /// Read every manifest file, in order.
    ///
    /// # Errors
    ///
    /// Returns the first read or validation error.
    pub fn load_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<WebApp>> {
        paths.iter().try_fold(Vec::new(), |mut all, path| {
            all.extend(self.load_file(path.as_ref())?);
            Ok(all)
        })
    }

    fn admit(&self, document: Document) -> std::result::Result<WebApp, String> {
        if document.api_version != self.gvk.api_version() || document.kind != self.gvk.kind {
            return Err(format!(
                "expected {} {}, got {} {}",
                self.gvk.api_version(),
                self.gvk.kind,
                document.api_version,
                document.kind
            ));
        }

        let namespace = document
            .metadata
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        self.check_name("metadata.name", &document.metadata.name)?;
        self.check_name("metadata.namespace", &namespace)?;
        document.spec.validate().map_err(|e| e.to_string())?;

        let mut webapp = WebApp::new(namespace, document.metadata.name, document.spec);
        webapp.metadata.labels = document.metadata.labels;
        Ok(webapp)
    }

    fn check_name(&self, field: &str, value: &str) -> std::result::Result<(), String> {
        if value.len() > MAX_NAME_LEN {
            return Err(format!("{field} must be at most {MAX_NAME_LEN} characters"));
        }
        if !self.name_pattern.is_match(value) {
            return Err(format!(
                "{field} '{value}' must consist of lower case alphanumerics or '-', \
                 and start and end with an alphanumeric"
            ));
        }
        Ok(())
    }
}

/// Print the dependents each WebApp would get, as multi-document YAML.
///
/// # Errors
///
/// Returns an error if the scheme lacks a kind or serialization fails.
pub fn render(webapps: &[WebApp], scheme: &Scheme) -> Result<String> {
    let workload_gvk = scheme.gvk(Kind::Workload)?;
    let exposure_gvk = scheme.gvk(Kind::Exposure)?;

    let mut documents = Vec::with_capacity(webapps.len().saturating_mul(2));
    for webapp in webapps {
        let workload = workload_for(webapp, scheme)?;
        let exposure = exposure_for(webapp, scheme)?;
        documents.push(serde_yaml::to_string(&Rendered::new(
            workload_gvk,
            &workload.metadata,
            &workload.spec,
        ))?);
        documents.push(serde_yaml::to_string(&Rendered::new(
            exposure_gvk,
            &exposure.metadata,
            &exposure.spec,
        ))?);
    }

    Ok(documents.join("---\n"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::io::Write;

    use super::*;

    const NGINX: &str = "\
apiVersion: example.com/v1
kind: WebApp
metadata:
  name: nginx-app
spec:
  image: nginx:1.25
  replicas: 3
  port: 80
  env:
    - name: MODE
      value: prod
";

    fn loader() -> ManifestLoader {
        ManifestLoader::new(&Scheme::webapp_operator()).expect("loader")
    }

    fn reason(result: Result<Vec<WebApp>>) -> String {
        match result {
            Err(Error::Manifest { reason, .. }) => reason,
            other => format!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_single_document() -> Result<()> {
        let webapps = loader().parse(NGINX)?;
        let [webapp] = webapps.as_slice() else {
            return Err(Error::manifest(0, "expected one webapp"));
        };

        assert_eq!(webapp.metadata.namespace, DEFAULT_NAMESPACE);
        assert_eq!(webapp.metadata.name, "nginx-app");
        assert_eq!(webapp.spec.image, "nginx:1.25");
        assert_eq!(webapp.spec.replicas, 3);
        assert_eq!(webapp.spec.port, Some(80));
        assert_eq!(webapp.spec.env.len(), 1);
        assert!(webapp.metadata.uid.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_multiple_documents_skips_empty() -> Result<()> {
        let content = format!(
            "---\n{NGINX}---\n---\napiVersion: example.com/v1\nkind: WebApp\n\
             metadata:\n  name: api\n  namespace: staging\nspec:\n  image: api:2\n  replicas: 1\n"
        );
        let webapps = loader().parse(&content)?;
        assert_eq!(webapps.len(), 2);
        assert_eq!(webapps.get(1).map(|w| w.metadata.namespace.as_str()), Some("staging"));
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let content = NGINX.replace("kind: WebApp", "kind: Deployment");
        let message = reason(loader().parse(&content));
        assert!(message.contains("expected example.com/v1 WebApp"), "{message}");
    }

    #[test]
    fn test_rejects_invalid_name() {
        let long = "a".repeat(64);
        for name in ["Nginx", "-nginx", "nginx_app", long.as_str()] {
            let content = NGINX.replace("name: nginx-app", &format!("name: {name}"));
            let message = reason(loader().parse(&content));
            assert!(message.contains("metadata.name"), "{name}: {message}");
        }
    }

    #[test]
    fn test_rejects_out_of_range_replicas() {
        let content = NGINX.replace("replicas: 3", "replicas: 11");
        let message = reason(loader().parse(&content));
        assert!(message.contains("spec.replicas"), "{message}");
    }

    #[test]
    fn test_rejects_unknown_field() {
        let content = NGINX.replace("name: nginx-app", "name: nginx-app\n  uid: abc");
        assert!(matches!(
            loader().parse(&content),
            Err(Error::Manifest { document: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_identity() {
        let content = format!("{NGINX}---\n{NGINX}");
        assert!(matches!(
            loader().parse(&content),
            Err(Error::Manifest { document: 2, .. })
        ));
    }

    #[test]
    fn test_load_all_reads_files_in_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut first = tempfile::NamedTempFile::new()?;
        write!(first, "{NGINX}")?;
        let mut second = tempfile::NamedTempFile::new()?;
        write!(second, "{}", NGINX.replace("nginx-app", "other-app"))?;

        let webapps = loader().load_all(&[first.path(), second.path()])?;
        let names: Vec<&str> = webapps.iter().map(|w| w.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["nginx-app", "other-app"]);
        Ok(())
    }

    #[test]
    fn test_render_emits_workload_and_exposure() -> Result<()> {
        let scheme = Scheme::webapp_operator();
        let webapps = loader().parse(NGINX)?;
        let output = render(&webapps, &scheme)?;

        let documents: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&output)
            .map(serde_yaml::Value::deserialize)
            .collect::<std::result::Result<_, _>>()?;
        let kinds: Vec<Option<&str>> = documents
            .iter()
            .map(|d| d.get("kind").and_then(serde_yaml::Value::as_str))
            .collect();
        assert_eq!(kinds, vec![Some("Deployment"), Some("Service")]);

        let replicas = documents
            .first()
            .and_then(|d| d.get("spec"))
            .and_then(|s| s.get("replicas"))
            .and_then(serde_yaml::Value::as_i64);
        assert_eq!(replicas, Some(3));
        assert!(output.contains("apiVersion: apps/v1"));
        assert!(output.contains("managed-by: webapp-operator"));
        Ok(())
    }
}
