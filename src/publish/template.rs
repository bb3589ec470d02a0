//! Install manifest and index page templates.
//!
//! Both documents are rendered with handlebars from fixed-schema contexts.
//! Built-in templates are embedded; configuration may point at replacement
//! files that use the same fields.

use crate::error::{ErrorExt, PipelineError, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

const MANIFEST: &str = "manifest.plist";
const INDEX: &str = "index.html";

/// itms-services install manifest.
pub const MANIFEST_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>items</key>
  <array>
    <dict>
      <key>assets</key>
      <array>
        <dict>
          <key>kind</key>
          <string>software-package</string>
          <key>url</key>
          <string>{{ipa_url}}</string>
        </dict>
      </array>
      <key>metadata</key>
      <dict>
        <key>bundle-identifier</key>
        <string>{{bundle_identifier}}</string>
        <key>bundle-version</key>
        <string>{{version_string}}</string>
        <key>kind</key>
        <string>software</string>
        <key>title</key>
        <string>{{title}}</string>
      </dict>
    </dict>
  </array>
</dict>
</plist>
"#;

/// Landing page listing installable builds.
pub const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{company_name}} Builds</title>
</head>
<body>
  <h1>{{company_name}}</h1>
  <ul>
{{#each builds}}
    <li><a href="itms-services://?action=download-manifest&amp;url={{url}}">{{title}}</a></li>
{{/each}}
  </ul>
</body>
</html>
"#;

/// Fields of the install manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestContext<'a> {
    /// Public URL of the uploaded `.ipa`
    pub ipa_url: &'a str,
    /// `CFBundleIdentifier`
    pub bundle_identifier: &'a str,
    /// "major.minor.build"
    pub version_string: &'a str,
    /// Display title
    pub title: &'a str,
}

/// One row of the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// Install manifest URL
    pub url: String,
    /// Row label
    pub title: String,
}

/// Fields of the index page.
#[derive(Debug, Clone, Serialize)]
pub struct IndexContext<'a> {
    /// Heading
    pub company_name: &'a str,
    /// Rows, in display order
    pub builds: &'a [IndexEntry],
}

/// Registered manifest and index templates.
pub struct TemplateSet {
    registry: Handlebars<'static>,
}

impl TemplateSet {
    /// Built-in templates only.
    pub fn builtin() -> Result<Self> {
        Self::from_sources(MANIFEST_TEMPLATE, INDEX_TEMPLATE)
    }

    /// Built-in templates, replaced by whichever override files are given.
    pub async fn load(manifest: Option<&Path>, index: Option<&Path>) -> Result<Self> {
        let manifest_source = match manifest {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .fs_context("reading manifest template", path)?,
            None => MANIFEST_TEMPLATE.to_string(),
        };
        let index_source = match index {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .fs_context("reading index template", path)?,
            None => INDEX_TEMPLATE.to_string(),
        };
        Self::from_sources(&manifest_source, &index_source)
    }

    /// Register templates from source text.
    pub fn from_sources(manifest: &str, index: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        // Default escaping is HTML entity escaping, which is also valid XML
        registry
            .register_template_string(MANIFEST, manifest)
            .map_err(|e| template_error(MANIFEST, e))?;
        registry
            .register_template_string(INDEX, index)
            .map_err(|e| template_error(INDEX, e))?;
        Ok(Self { registry })
    }

    /// Render the install manifest.
    pub fn render_manifest(&self, context: &ManifestContext<'_>) -> Result<String> {
        self.registry
            .render(MANIFEST, context)
            .map_err(|e| template_error(MANIFEST, e))
    }

    /// Render the index page.
    pub fn render_index(&self, context: &IndexContext<'_>) -> Result<String> {
        self.registry
            .render(INDEX, context)
            .map_err(|e| template_error(INDEX, e))
    }
}

fn template_error(template: &str, error: impl std::fmt::Display) -> PipelineError {
    PipelineError::Template {
        template: template.to_string(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_carries_all_four_fields() {
        let templates = TemplateSet::builtin().unwrap();
        let rendered = templates
            .render_manifest(&ManifestContext {
                ipa_url: "https://b.s3.amazonaws.com/com.app.foo-2.3.0.ipa",
                bundle_identifier: "com.app.foo",
                version_string: "2.3.0",
                title: "Foo & Co-2.3.0",
            })
            .unwrap();

        assert!(rendered.contains("<string>https://b.s3.amazonaws.com/com.app.foo-2.3.0.ipa</string>"));
        assert!(rendered.contains("<string>com.app.foo</string>"));
        assert!(rendered.contains("<string>2.3.0</string>"));
        assert!(rendered.contains("Foo &amp; Co-2.3.0"));
    }

    #[test]
    fn index_lists_every_build() {
        let templates = TemplateSet::builtin().unwrap();
        let builds = vec![
            IndexEntry {
                url: "https://x/id-1.0.0.plist".into(),
                title: "App-1.0.0".into(),
            },
            IndexEntry {
                url: "https://x/id-1.0.1.plist".into(),
                title: "App-1.0.1".into(),
            },
        ];
        let rendered = templates
            .render_index(&IndexContext {
                company_name: "Acme",
                builds: &builds,
            })
            .unwrap();

        assert!(rendered.contains("<h1>Acme</h1>"));
        assert_eq!(rendered.matches("<li>").count(), 2);
        assert!(rendered.contains(">App-1.0.1</a>"));
    }

    #[test]
    fn broken_override_is_a_template_error() {
        let err = TemplateSet::from_sources("{{#each}}", INDEX_TEMPLATE)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Template { ref template, .. } if template == MANIFEST));
    }

    #[tokio::test]
    async fn override_file_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.hbs");
        std::fs::write(&path, "{{company_name}}:{{#each builds}}{{title}};{{/each}}").unwrap();

        let templates = TemplateSet::load(None, Some(&path)).await.unwrap();
        let builds = vec![IndexEntry {
            url: "u".into(),
            title: "T".into(),
        }];
        let rendered = templates
            .render_index(&IndexContext {
                company_name: "Acme",
                builds: &builds,
            })
            .unwrap();
        assert_eq!(rendered, "Acme:T;");
    }
}
