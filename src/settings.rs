/// Options shared by the parser, the filter chain and the renderer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSettings {
    /// Encoding used when a template has neither a BOM nor an XML declaration.
    pub default_encoding: String,
    /// The templating namespace prefix. A template may switch it with
    /// `xmlns:prefix="http://wicket.apache.org"`.
    pub namespace: String,
    /// Drop `<!-- -->` comments. Conditional comments are always kept.
    pub strip_comments: bool,
    /// Collapse runs of whitespace in text outside `<pre>`.
    pub compress_whitespace: bool,
    /// Leave namespace tags and `ns:id` attributes out of rendered output.
    pub strip_wicket_tags: bool,
    /// Prefix prepended to relative `href`/`src`/`background`/`action` values.
    pub context_path: Option<String>,
    /// Treat every relative link as if it were inside `<ns:link>`.
    pub auto_link_all: bool,
    pub throw_on_missing_xml_declaration: bool,
    pub throw_on_missing_message: bool,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        Self {
            default_encoding: "UTF-8".to_string(),
            namespace: "wicket".to_string(),
            strip_comments: false,
            compress_whitespace: false,
            strip_wicket_tags: false,
            context_path: None,
            auto_link_all: false,
            throw_on_missing_xml_declaration: false,
            throw_on_missing_message: true,
        }
    }
}

impl MarkupSettings {
    /// Settings for production rendering: comments and namespace tags are
    /// removed and whitespace is collapsed.
    pub fn deployment() -> Self {
        Self {
            strip_comments: true,
            compress_whitespace: true,
            strip_wicket_tags: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_defaults() {
        let settings = MarkupSettings::default();
        assert_eq!(settings.default_encoding, "UTF-8");
        assert_eq!(settings.namespace, "wicket");
        assert!(!settings.strip_wicket_tags);
        assert!(settings.throw_on_missing_message);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_deployment_strips() {
        let settings = MarkupSettings::deployment();
        assert!(settings.strip_comments && settings.compress_whitespace);
        assert!(settings.strip_wicket_tags);
        assert_eq!(settings.namespace, "wicket");
    }
}
