use crate::tag::Position;

pub type MarkletResult<T> = std::result::Result<T, MarkletError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("No matching close bracket")]
    UnclosedBracket,
    #[error("Found empty tag: '<>'")]
    EmptyTag,
    #[error("Malformed tag")]
    MalformedTag,
    #[error("Same attribute found twice: {key}")]
    DuplicateAttribute { key: String },
    #[error("Unclosed {what} beginning here")]
    UnclosedSection { what: String },
    #[error("{tag} tag not closed")]
    UnclosedRawBody { tag: String },
    #[error("Tag <{name}> does not have a close tag")]
    MissingCloseTag { name: String },
    #[error("Found close tag </{name}> without a matching open tag")]
    UnmatchedCloseTag { name: String },
    #[error("Close tag </{found}> does not match open tag <{expected}>")]
    MismatchedCloseTag { expected: String, found: String },
    #[error("The {namespace}:id attribute value must not be empty")]
    EmptyComponentId { namespace: String },
    #[error("Unknown tag name with namespace '{namespace}': {name}")]
    UnknownNamespaceTag { namespace: String, name: String },
    #[error("Parser error: {0}")]
    Message(String),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("Parse error at line {line}, column {column}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    #[source]
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub const fn at(position: Position, kind: ParseErrorKind) -> Self {
        Self {
            line: position.line,
            column: position.column,
            kind,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum MarkletError {
    #[error("Unsupported encoding '{label}' for markup {key}")]
    Encoding { key: String, label: String },

    #[error("Failed to parse markup {key}: {error}")]
    Parse {
        key: String,
        #[source]
        error: ParseError,
    },

    #[error("{message} (markup {key}{})", fmt_position(.position.as_ref()))]
    Markup {
        key: String,
        position: Option<Position>,
        message: String,
    },

    #[error(
        "Unable to find component with id '{id}' in {container}. Expected: '{path}'. Found with similar names: '{}' (markup {key}{})",
        .similar.join("', '"),
        fmt_position(.position.as_ref())
    )]
    UnmatchedTag {
        key: String,
        id: String,
        path: String,
        container: String,
        position: Option<Position>,
        similar: Vec<String>,
    },

    #[error("Component '{path}' was added to {container} but is not declared in its markup {key}")]
    MissingTag {
        key: String,
        path: String,
        container: String,
    },

    #[error("Component '{path}' cannot find its parent {role}{}", fmt_ancestor(.ancestor.as_deref()))]
    Containment {
        key: String,
        path: String,
        role: String,
        ancestor: Option<String>,
    },

    #[error("Markup not found: {key}")]
    ResourceNotFound { key: String },

    #[error("Property '{message_key}' not found in message bundles. Markup: {key}")]
    MissingMessage { key: String, message_key: String },

    #[error("Failed to read markup {key}: {message}")]
    Io { key: String, message: String },

    #[error("Markup {key} has already been sealed")]
    Sealed { key: String },

    #[error("Invalid paging: {message}")]
    Paging { message: String },
}

fn fmt_position(position: Option<&Position>) -> String {
    position.map_or_else(String::new, |p| format!(", {p}"))
}

fn fmt_ancestor(ancestor: Option<&str>) -> String {
    ancestor.map_or_else(String::new, |a| format!(" '{a}'"))
}

impl MarkletError {
    pub(crate) fn parse(key: impl ToString, error: ParseError) -> Self {
        Self::Parse {
            key: key.to_string(),
            error,
        }
    }

    /// The position in the template source the error points at, if known.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Parse { error, .. } => Some((error.line, error.column)),
            Self::Markup { position, .. } | Self::UnmatchedTag { position, .. } => {
                position.map(|p| (p.line, p.column))
            }
            Self::Encoding { .. }
            | Self::MissingTag { .. }
            | Self::Containment { .. }
            | Self::ResourceNotFound { .. }
            | Self::MissingMessage { .. }
            | Self::Io { .. }
            | Self::Sealed { .. }
            | Self::Paging { .. } => None,
        }
    }
}
