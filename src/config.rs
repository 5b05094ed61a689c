//! Generation settings shared by every pipeline stage.

/// What to do with a type that no scope candidate resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Abort the run, naming the declaration.
    #[default]
    Strict,
    /// Leave the type unresolved on the node; the filter rejects the variant.
    Lenient,
}

/// Pipeline configuration, built once by the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ambient top namespace; dotted names are relative to it.
    pub root_namespace: String,
    /// Prefix of every emitted symbol and output file.
    pub prefix: String,
    pub max_mandatory_args: usize,
    pub max_optional_args: usize,
    /// Bindable return (and surfaced output) types, in resolved form.
    pub return_types: Vec<String>,
    /// Bindable argument types, in resolved form.
    pub arg_types: Vec<String>,
    /// Output types callers may hand in as a reusable buffer.
    pub buffer_types: Vec<String>,
    /// Hand-bound types that resolve without any declaration.
    pub builtin_types: Vec<String>,
    /// Historical alias -> target pairs.
    pub typedefs: Vec<(String, String)>,
    pub unresolved: UnresolvedPolicy,
}

const RETURN_TYPES: &[&str] = &[
    "bool",
    "size_t",
    "int",
    "int*",
    "uchar",
    "double",
    "float",
    "string",
    "cv.Mat",
    "cv.Size",
    "cv.Size2f",
    "cv.Point",
    "cv.Point2f",
    "cv.RotatedRect",
    "vector<cv.Mat>",
    "vector<cv.Point>",
];

const ARG_TYPES: &[&str] = &[
    "bool",
    "size_t",
    "int",
    "int*",
    "uchar",
    "double",
    "float",
    "string",
    "c_string",
    "cv.Mat",
    "cv.Scalar",
    "cv.Size",
    "cv.Size2f",
    "cv.Rect",
    "cv.Point",
    "cv.Point2f",
    "cv.RotatedRect",
    "vector<int>",
    "vector<cv.Mat>",
    "vector<cv.Point>",
];

const BUFFER_TYPES: &[&str] = &["cv.Mat", "cv.UMat", "vector<cv.Mat>", "vector<cv.UMat>"];

const BUILTIN_TYPES: &[&str] = &[
    "cv.Mat",
    "cv.UMat",
    "cv.Scalar",
    "cv.Size",
    "cv.Size2f",
    "cv.Rect",
    "cv.Rect2d",
    "cv.Range",
    "cv.Point",
    "cv.Point2f",
    "cv.Point2d",
    "cv.Point3f",
    "cv.RotatedRect",
    "cv.TermCriteria",
    "cv.RNG",
];

const TYPEDEFS: &[(&str, &str)] = &[
    ("cv.FeatureDetector", "cv.Feature2D"),
    ("cv.DescriptorExtractor", "cv.Feature2D"),
];

/// The type lists above name the library as `cv`; rewrite that leading
/// segment (also inside `vector<...>`) to `root`.
fn rooted(ty: &str, root: &str) -> String {
    if let Some(inner) = ty.strip_prefix("vector<").and_then(|t| t.strip_suffix('>')) {
        return format!("vector<{}>", rooted(inner, root));
    }
    match ty.strip_prefix("cv.") {
        Some(rest) => format!("{}.{}", root, rest),
        None => ty.to_string(),
    }
}

fn owned(list: &[&str], root: &str) -> Vec<String> {
    list.iter().map(|s| rooted(s, root)).collect()
}

impl Default for Config {
    fn default() -> Self {
        Config::for_root("cv")
    }
}

impl Config {
    /// Defaults for a library whose top-level namespace is `root`.
    pub fn for_root(root: &str) -> Self {
        Config {
            root_namespace: root.to_string(),
            prefix: "rbbind".to_string(),
            max_mandatory_args: 10,
            max_optional_args: 10,
            return_types: owned(RETURN_TYPES, root),
            arg_types: owned(ARG_TYPES, root),
            buffer_types: owned(BUFFER_TYPES, root),
            builtin_types: owned(BUILTIN_TYPES, root),
            typedefs: TYPEDEFS
                .iter()
                .map(|(a, t)| (rooted(a, root), rooted(t, root)))
                .collect(),
            unresolved: UnresolvedPolicy::Strict,
        }
    }

    pub fn is_buffer_type(&self, qualified: &str) -> bool {
        self.buffer_types.iter().any(|t| t == qualified)
    }
}

/// Parse an `ALIAS=TARGET` pair from the command line.
pub fn parse_typedef(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((alias, target)) if !alias.is_empty() && !target.is_empty() => {
            Ok((alias.trim().to_string(), target.trim().to_string()))
        }
        _ => Err(format!("expected ALIAS=TARGET, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typedef_pair() {
        assert_eq!(
            parse_typedef("cv.Old=cv.New").unwrap(),
            ("cv.Old".to_string(), "cv.New".to_string())
        );
        assert!(parse_typedef("cv.Old").is_err());
        assert!(parse_typedef("=cv.New").is_err());
    }

    #[test]
    fn lists_follow_the_root_namespace() {
        let cfg = Config::for_root("dv");
        assert_eq!(cfg.root_namespace, "dv");
        assert!(cfg.arg_types.contains(&"dv.Mat".to_string()));
        assert!(cfg.arg_types.contains(&"vector<dv.Point>".to_string()));
        assert!(cfg.arg_types.contains(&"int".to_string()));
        assert!(cfg.is_buffer_type("vector<dv.UMat>"));
        assert!(cfg.builtin_types.iter().all(|t| !t.starts_with("cv.")));
        assert_eq!(cfg.typedefs[0], ("dv.FeatureDetector".to_string(), "dv.Feature2D".to_string()));
    }

    #[test]
    fn return_types_are_also_argument_types() {
        let cfg = Config::default();
        assert!(cfg.return_types.iter().all(|t| cfg.arg_types.contains(t)));
    }
}
