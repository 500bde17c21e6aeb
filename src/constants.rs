//! Common constants used throughout Scaffold.

/// Namespace prefix that marks an element as a directive (`<k:include />`)
pub const DIRECTIVE_PREFIX: &str = "k";

/// Namespace URI bound to [`DIRECTIVE_PREFIX`] on the synthetic wrapper
pub const DIRECTIVE_NAMESPACE: &str = "/";

/// Tag of the synthetic element every template source is wrapped in
pub const WRAPPER_TAG: &str = "scaffold-root";

/// Tag used to wrap included markup before it is parsed as a fragment
pub const FRAGMENT_TAG: &str = "scaffold-fragment";

/// Attribute set on a directive element once it has been extracted
pub const EXTRACTED_ATTRIBUTE: &str = "extracted";

/// Reserved binding key supplying the fallback resolver
pub const DEFAULT_KEY: &str = "@default";

/// Placeholders bound automatically on every duplicated block
pub const BLOCK_POSITION_KEY: &str = "_position";
pub const BLOCK_PARITY_KEY: &str = "_parity";
pub const BLOCK_NAME_KEY: &str = "_name";

/// Elements that never hold content: the parser does not open a scope for
/// them and the serializer writes them in short form when they are empty
pub const VOID_ELEMENTS: [&str; 19] = [
    "area", "base", "basefont", "br", "col", "command", "embed", "frame", "hr", "img", "input",
    "isindex", "keygen", "link", "meta", "param", "source", "track", "wbr",
];
