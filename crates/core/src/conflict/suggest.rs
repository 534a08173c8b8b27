//! Resolution suggestions from change descriptions.
//!
//! Scores each side of a conflict against the free-text description of the
//! change that produced it (commit message, changelist description) and
//! suggests a side when one is clearly more relevant. Falls back to a few
//! property heuristics. Everything here is read-only except
//! [`auto_resolve_where_possible`], which goes through
//! [`MergeResult::apply_resolution`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::DiffContext;

use super::detector::Conflict;
use super::merger::MergeResult;
use super::resolver::Resolution;

// ---------------------------------------------------------------------------
// Change descriptions
// ---------------------------------------------------------------------------

/// Version control system a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsKind {
    Git,
    Perforce,
    Unknown,
}

/// A commit or changelist, independent of the VCS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeInfo {
    /// Commit hash or changelist number.
    pub identifier: String,
    pub author: String,
    pub date: String,
    pub description: String,
    pub vcs: VcsKind,
}

impl ChangeInfo {
    /// First line of the description.
    pub fn summary(&self) -> &str {
        self.description.trim().lines().next().unwrap_or("")
    }

    fn short_id(&self) -> String {
        self.identifier.chars().take(8).collect()
    }
}

/// Looks up change descriptions by reference (`HEAD`, a hash, a changelist).
pub trait ChangeSource {
    fn change_info(&self, reference: &str) -> Option<ChangeInfo>;
}

const COMPONENT_TYPES: &[&str] = &[
    "Transform",
    "RectTransform",
    "SpriteRenderer",
    "Image",
    "Button",
    "Text",
    "Canvas",
    "Animator",
    "Collider",
    "Rigidbody",
    "AudioSource",
    "ParticleSystem",
    "Light",
    "Camera",
];

const INTENT_PATTERNS: &[(&str, &str)] = &[
    (r"\b(fix|bug|issue|crash|error)\b", "bug fix"),
    (r"\b(add|new|create|implement)\b", "new feature"),
    (r"\b(update|modify|change|adjust)\b", "modification"),
    (r"\b(remove|delete|clean)\b", "removal"),
    (r"\b(refactor|reorganize|restructure)\b", "refactoring"),
    (r"\b(position|move|layout|align)\b", "layout change"),
    (r"\b(color|style|visual|appearance)\b", "visual change"),
    (r"\b(size|scale|dimension)\b", "size change"),
    (r"\b(animation|anim)\b", "animation change"),
    (r"\b(collider|physics|trigger)\b", "physics change"),
];

fn path_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z][a-zA-Z0-9]*(?:/[A-Z][a-zA-Z0-9]*)+)\b").ok())
        .as_ref()
}

fn quoted_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).ok()).as_ref()
}

fn intent_regexes() -> &'static [(Regex, &'static str)] {
    static RES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RES.get_or_init(|| {
        INTENT_PATTERNS
            .iter()
            .filter_map(|(pattern, intent)| Regex::new(pattern).ok().map(|re| (re, *intent)))
            .collect()
    })
}

/// Object and component names mentioned in a description: slash paths
/// (`Canvas/Panel`), quoted strings, and well-known component types.
/// Sorted and deduplicated.
pub fn extract_object_names(description: &str) -> Vec<String> {
    let mut names = BTreeSet::new();

    if let Some(re) = path_regex() {
        for caps in re.captures_iter(description) {
            if let Some(m) = caps.get(1) {
                names.insert(m.as_str().to_string());
            }
        }
    }
    if let Some(re) = quoted_regex() {
        for caps in re.captures_iter(description) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                names.insert(m.as_str().to_string());
            }
        }
    }
    let lower = description.to_lowercase();
    for component in COMPONENT_TYPES {
        if lower.contains(&component.to_lowercase()) {
            names.insert((*component).to_string());
        }
    }

    names.into_iter().collect()
}

/// Short intent label for a description: the first matching intent pattern,
/// otherwise the first line cut to 50 characters.
pub fn infer_intent(description: &str) -> String {
    let lower = description.to_lowercase();
    if let Some((_, intent)) = intent_regexes().iter().find(|(re, _)| re.is_match(&lower)) {
        return (*intent).to_string();
    }

    let first_line = description.trim().lines().next().unwrap_or("");
    if first_line.chars().count() > 50 {
        format!("{}...", first_line.chars().take(50).collect::<String>())
    } else {
        first_line.to_string()
    }
}

/// What each side's change says it was doing.
#[derive(Debug, Clone, Default)]
pub struct ModificationContext {
    pub ours_change: Option<ChangeInfo>,
    pub theirs_change: Option<ChangeInfo>,
    pub ours_objects: Vec<String>,
    pub theirs_objects: Vec<String>,
    pub ours_intent: String,
    pub theirs_intent: String,
}

impl ModificationContext {
    pub fn from_changes(ours: Option<ChangeInfo>, theirs: Option<ChangeInfo>) -> Self {
        let analyze = |change: &Option<ChangeInfo>| match change {
            Some(c) => (extract_object_names(&c.description), infer_intent(&c.description)),
            None => (Vec::new(), String::new()),
        };
        let (ours_objects, ours_intent) = analyze(&ours);
        let (theirs_objects, theirs_intent) = analyze(&theirs);
        Self {
            ours_change: ours,
            theirs_change: theirs,
            ours_objects,
            theirs_objects,
            ours_intent,
            theirs_intent,
        }
    }

    /// Look both references up in `source`.
    pub fn from_source(source: &dyn ChangeSource, ours_ref: &str, theirs_ref: &str) -> Self {
        let ours = source.change_info(ours_ref);
        let theirs = source.change_info(theirs_ref);
        if ours.is_none() || theirs.is_none() {
            debug!(ours_ref, theirs_ref, "change description unavailable");
        }
        Self::from_changes(ours, theirs)
    }

    fn side(&self, side: Side) -> (Option<&ChangeInfo>, &[String], &str) {
        match side {
            Side::Ours => (
                self.ours_change.as_ref(),
                self.ours_objects.as_slice(),
                self.ours_intent.as_str(),
            ),
            Side::Theirs => (
                self.theirs_change.as_ref(),
                self.theirs_objects.as_slice(),
                self.theirs_intent.as_str(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Ours,
    Theirs,
}

/// Suggested way to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Ours,
    Theirs,
    Manual,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

fn rendered_path(conflict: &Conflict) -> String {
    conflict
        .property_path()
        .map(|p| p.to_string())
        .unwrap_or_default()
        .to_lowercase()
}

/// How strongly one side's change description relates to `conflict`.
pub fn relevance_score(conflict: &Conflict, context: &ModificationContext, side: Side) -> i32 {
    let (change, objects, intent) = context.side(side);
    let Some(change) = change else {
        return 0;
    };
    let mut score = 0;

    if let Some(node) = conflict.game_object_name.as_deref().map(str::to_lowercase) {
        for name in objects.iter().map(|n| n.to_lowercase()) {
            if name.contains(&node) {
                score += 3;
            }
            if node.contains(&name) {
                score += 2;
            }
        }
    }

    let class = conflict.class_name.to_lowercase();
    score += 2 * objects
        .iter()
        .filter(|n| n.to_lowercase().contains(&class))
        .count() as i32;

    let description = change.description.to_lowercase();
    if let Some(leaf) = conflict.property_path().and_then(|p| p.leaf_name()) {
        if description.contains(&leaf.to_lowercase()) {
            score += 3;
        }
    }

    let intent = intent.to_lowercase();
    if intent.contains("bug fix") {
        score += 2;
    }
    if intent.contains("new feature") {
        score += 1;
    }
    let path = rendered_path(conflict);
    if intent.contains("layout") && ["position", "size", "anchor"].iter().any(|p| path.contains(p)) {
        score += 2;
    }

    score
}

fn is_enabled(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(v) => v.as_f64() == Some(1.0),
        None => false,
    }
}

/// Suggest a side for `conflict`, with a human-readable reason.
///
/// A side wins outright when its relevance score leads by more than
/// `score_margin`. Otherwise transform values need a person, the higher
/// sorting order wins, and an enabled flag beats a disabled one.
pub fn suggest_resolution(
    conflict: &Conflict,
    context: Option<&ModificationContext>,
    score_margin: i32,
) -> (ResolutionStrategy, String) {
    if let Some(context) = context {
        let ours = relevance_score(conflict, context, Side::Ours);
        let theirs = relevance_score(conflict, context, Side::Theirs);
        if ours > theirs + score_margin {
            return (
                ResolutionStrategy::Ours,
                format!("our change is more relevant (score: {ours} vs {theirs})"),
            );
        }
        if theirs > ours + score_margin {
            return (
                ResolutionStrategy::Theirs,
                format!("their change is more relevant (score: {theirs} vs {ours})"),
            );
        }
    }

    let path = rendered_path(conflict);
    if ["position", "rotation", "scale"].iter().any(|p| path.contains(p)) {
        return (
            ResolutionStrategy::Manual,
            "transform changes require manual review".into(),
        );
    }

    if path.contains("sortingorder") || path.contains("sortinglayer") {
        let ours = conflict.ours.as_ref().and_then(Value::as_f64);
        let theirs = conflict.theirs.as_ref().and_then(Value::as_f64);
        if let (Some(o), Some(t)) = (ours, theirs) {
            let side = if o >= t {
                ResolutionStrategy::Ours
            } else {
                ResolutionStrategy::Theirs
            };
            return (side, "taking higher sorting order".into());
        }
    }

    if path.contains("enabled") || path.contains("isactive") {
        if is_enabled(conflict.ours.as_ref()) {
            return (ResolutionStrategy::Ours, "keeping object/component enabled".into());
        }
        if is_enabled(conflict.theirs.as_ref()) {
            return (ResolutionStrategy::Theirs, "keeping object/component enabled".into());
        }
    }

    (
        ResolutionStrategy::Manual,
        "overlapping changes require human decision".into(),
    )
}

/// Compact display form of a property value. References to known scripts
/// and assets are shown by name.
pub fn format_value(value: Option<&Value>, ctx: &DiffContext) -> String {
    let Some(value) = value else {
        return "<absent>".into();
    };
    match value {
        Value::Object(map) => {
            let field = |k: &str| map.get(k).map(plain).unwrap_or_default();
            if map.contains_key("x") && map.contains_key("y") {
                let mut parts = vec![field("x"), field("y")];
                if map.contains_key("z") {
                    parts.push(field("z"));
                    if map.contains_key("w") {
                        parts.push(field("w"));
                    }
                }
                format!("({})", parts.join(", "))
            } else if map.contains_key("r") && map.contains_key("g") {
                let channel =
                    |k: &str, d: &str| map.get(k).map(plain).unwrap_or_else(|| d.to_string());
                format!(
                    "rgba({}, {}, {}, {})",
                    channel("r", "0"),
                    channel("g", "0"),
                    channel("b", "0"),
                    channel("a", "1")
                )
            } else if let Some(id) = map.get("fileID") {
                let guid = map.get("guid").and_then(Value::as_str).unwrap_or_default();
                if let Some(name) = ctx.script_name(guid) {
                    format!("script({name})")
                } else if let Some(path) = ctx.asset_path(guid) {
                    format!("asset({path})")
                } else {
                    format!("ref({})", plain(id))
                }
            } else {
                value.to_string()
            }
        }
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::String(s) if s.chars().count() > 30 => {
            format!("\"{}...\"", s.chars().take(27).collect::<String>())
        }
        other => plain(other),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Conflict review
// ---------------------------------------------------------------------------

/// A conflict with display fields and a suggested resolution.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictInfo {
    pub conflict: Conflict,
    /// Hierarchy path, node name, or `Object[<id>]`.
    pub game_object_path: String,
    pub component_type: String,
    pub property_display: String,
    pub ours_context: String,
    pub theirs_context: String,
    pub suggestion: ResolutionStrategy,
    pub reason: String,
}

impl ConflictInfo {
    pub fn new(conflict: &Conflict, context: Option<&ModificationContext>, ctx: &DiffContext) -> Self {
        let game_object_path = conflict
            .hierarchy_path
            .clone()
            .or_else(|| conflict.game_object_name.clone())
            .unwrap_or_else(|| format!("Object[{}]", conflict.local_id));

        let mut property_display = conflict.display_path();
        if conflict.ours.is_some() && conflict.theirs.is_some() {
            property_display = format!(
                "{property_display}: {} vs {}",
                format_value(conflict.ours.as_ref(), ctx),
                format_value(conflict.theirs.as_ref(), ctx)
            );
        }

        let describe = |change: Option<&ChangeInfo>, intent: &str| {
            change
                .map(|c| format!("{}: {intent}", c.short_id()))
                .unwrap_or_default()
        };
        let (ours_context, theirs_context) = match context {
            Some(ctx) => (
                describe(ctx.ours_change.as_ref(), &ctx.ours_intent),
                describe(ctx.theirs_change.as_ref(), &ctx.theirs_intent),
            ),
            None => (String::new(), String::new()),
        };

        let (suggestion, reason) = suggest_resolution(conflict, context, ctx.score_margin);
        Self {
            conflict: conflict.clone(),
            game_object_path,
            component_type: conflict.class_name.clone(),
            property_display,
            ours_context,
            theirs_context,
            suggestion,
            reason,
        }
    }
}

/// Build a [`ConflictInfo`] for every pending conflict of `result`.
pub fn build_conflict_infos(
    result: &MergeResult,
    context: Option<&ModificationContext>,
    ctx: &DiffContext,
) -> Vec<ConflictInfo> {
    result
        .conflicts
        .iter()
        .map(|c| ConflictInfo::new(c, context, ctx))
        .collect()
}

/// Apply every `Ours`/`Theirs` suggestion on a property conflict. Returns
/// how many were applied and the infos still needing a decision.
pub fn auto_resolve_where_possible(
    result: &mut MergeResult,
    infos: Vec<ConflictInfo>,
) -> (usize, Vec<ConflictInfo>) {
    let mut resolved = 0;
    let mut remaining = Vec::new();

    for info in infos {
        let resolution = match info.suggestion {
            ResolutionStrategy::Ours => Resolution::AcceptOurs,
            ResolutionStrategy::Theirs => Resolution::AcceptTheirs,
            ResolutionStrategy::Manual => {
                remaining.push(info);
                continue;
            }
        };
        if info.conflict.is_object_level() {
            remaining.push(info);
            continue;
        }
        match result.apply_resolution(&info.conflict.id, resolution) {
            Ok(()) => {
                debug!(conflict_id = %info.conflict.id, suggestion = %info.suggestion, reason = %info.reason, "auto-resolved");
                resolved += 1;
            }
            Err(e) => {
                warn!(conflict_id = %info.conflict.id, error = %e, "auto-resolution failed");
                remaining.push(info);
            }
        }
    }

    info!(resolved, remaining = remaining.len(), "auto-resolution complete");
    (resolved, remaining)
}

/// Build infos for `result` and, when the context enables it, auto-resolve
/// the confident ones.
pub fn review_conflicts(
    result: &mut MergeResult,
    context: Option<&ModificationContext>,
    ctx: &DiffContext,
) -> (usize, Vec<ConflictInfo>) {
    let infos = build_conflict_infos(result, context, ctx);
    if ctx.auto_resolve {
        auto_resolve_where_possible(result, infos)
    } else {
        (0, infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::detector::{ConflictKind, ConflictScope};
    use crate::diff::PropertyPath;
    use std::collections::HashMap;

    fn change(id: &str, description: &str) -> ChangeInfo {
        ChangeInfo {
            identifier: id.into(),
            author: "dev".into(),
            date: "2024-01-01".into(),
            description: description.into(),
            vcs: VcsKind::Git,
        }
    }

    fn conflict(path: PropertyPath, ours: Value, theirs: Value) -> Conflict {
        let mut c = Conflict::new(7, "MonoBehaviour", ConflictScope::Property { path }, ConflictKind::BothModified)
            .with_values(Some(Value::from(0)), Some(ours), Some(theirs));
        c.game_object_name = Some("Player".into());
        c
    }

    #[test]
    fn test_extract_object_names() {
        let names = extract_object_names("Fix \"Player\" under Canvas/Panel/Button, tweak rigidbody");
        assert_eq!(
            names,
            vec!["Button", "Canvas", "Canvas/Panel/Button", "Player", "Rigidbody"]
        );
    }

    #[test]
    fn test_infer_intent() {
        assert_eq!(infer_intent("Fix crash on load"), "bug fix");
        assert_eq!(infer_intent("Move the button left"), "layout change");
        assert_eq!(infer_intent("WIP\nmore"), "WIP");
        let long = "x".repeat(60);
        assert_eq!(infer_intent(&long), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn test_summary() {
        assert_eq!(change("a", "\n first line \nsecond").summary(), "first line");
    }

    #[test]
    fn test_relevance_score() {
        let ctx = ModificationContext::from_changes(
            Some(change("abc", "Fix Player health")),
            Some(change("def", "tweak colors")),
        );
        let c = conflict(PropertyPath::root().key("health"), Value::from(80), Value::from(100));
        // Leaf name in the description plus a bug fix intent.
        assert_eq!(relevance_score(&c, &ctx, Side::Ours), 5);
        assert_eq!(relevance_score(&c, &ctx, Side::Theirs), 0);
        assert_eq!(
            relevance_score(&c, &ModificationContext::default(), Side::Ours),
            0
        );
    }

    #[test]
    fn test_suggest_by_score() {
        let ctx = ModificationContext::from_changes(
            Some(change("abc", "Fix 'Player' health")),
            Some(change("def", "tweak colors")),
        );
        let c = conflict(PropertyPath::root().key("health"), Value::from(80), Value::from(100));
        let (strategy, reason) = suggest_resolution(&c, Some(&ctx), 2);
        assert_eq!(strategy, ResolutionStrategy::Ours);
        assert!(reason.contains("more relevant"));
        // A huge margin falls through to the manual default.
        assert_eq!(suggest_resolution(&c, Some(&ctx), 100).0, ResolutionStrategy::Manual);
    }

    #[test]
    fn test_suggest_heuristics() {
        let pos = conflict(
            PropertyPath::root().key("m_LocalPosition").key("x"),
            Value::from(1),
            Value::from(2),
        );
        assert_eq!(suggest_resolution(&pos, None, 2).0, ResolutionStrategy::Manual);

        let sorting = conflict(PropertyPath::root().key("m_SortingOrder"), Value::from(3), Value::from(9));
        assert_eq!(suggest_resolution(&sorting, None, 2).0, ResolutionStrategy::Theirs);

        let enabled = conflict(PropertyPath::root().key("m_Enabled"), Value::from(0), Value::from(1));
        assert_eq!(suggest_resolution(&enabled, None, 2).0, ResolutionStrategy::Theirs);
    }

    #[test]
    fn test_format_value() {
        let ctx = DiffContext::default();
        assert_eq!(format_value(Some(&serde_json::json!({"x": 1, "y": 2, "z": 3})), &ctx), "(1, 2, 3)");
        assert_eq!(
            format_value(Some(&serde_json::json!({"r": 1, "g": 0.5, "b": 0})), &ctx),
            "rgba(1, 0.5, 0, 1)"
        );
        assert_eq!(format_value(Some(&serde_json::json!({"fileID": 12})), &ctx), "ref(12)");
        assert_eq!(format_value(Some(&serde_json::json!([1, 2])), &ctx), "[2 items]");
        assert_eq!(format_value(Some(&Value::from("a".repeat(40))), &ctx), format!("\"{}...\"", "a".repeat(27)));
        assert_eq!(format_value(None, &ctx), "<absent>");
    }

    #[test]
    fn test_format_value_names_known_references() {
        let ctx = DiffContext {
            script_names: [("s1".to_string(), "EnemyAI".to_string())].into(),
            asset_paths: [("m1".to_string(), "Assets/Materials/Red.mat".to_string())].into(),
            ..DiffContext::default()
        };
        let script = serde_json::json!({"fileID": 11500000, "guid": "s1", "type": 3});
        let material = serde_json::json!({"fileID": 2100000, "guid": "m1", "type": 2});
        let unknown = serde_json::json!({"fileID": 2100000, "guid": "zz", "type": 2});
        assert_eq!(format_value(Some(&script), &ctx), "script(EnemyAI)");
        assert_eq!(format_value(Some(&material), &ctx), "asset(Assets/Materials/Red.mat)");
        assert_eq!(format_value(Some(&unknown), &ctx), "ref(2100000)");

        let c = conflict(PropertyPath::root().key("m_Material"), material, unknown);
        let info = ConflictInfo::new(&c, None, &ctx);
        assert_eq!(
            info.property_display,
            "MonoBehaviour.m_Material: asset(Assets/Materials/Red.mat) vs ref(2100000)"
        );
    }

    struct FixedSource(HashMap<&'static str, ChangeInfo>);

    impl ChangeSource for FixedSource {
        fn change_info(&self, reference: &str) -> Option<ChangeInfo> {
            self.0.get(reference).cloned()
        }
    }

    #[test]
    fn test_context_from_source() {
        let source = FixedSource(HashMap::from([("HEAD", change("0123456789", "Add new enemy"))]));
        let ctx = ModificationContext::from_source(&source, "HEAD", "MERGE_HEAD");
        assert_eq!(ctx.ours_intent, "new feature");
        assert!(ctx.theirs_change.is_none());

        let c = conflict(PropertyPath::root().key("speed"), Value::from(1), Value::from(2));
        let info = ConflictInfo::new(&c, Some(&ctx), &DiffContext::default());
        assert_eq!(info.ours_context, "01234567: new feature");
        assert_eq!(info.theirs_context, "");
        assert_eq!(info.game_object_path, "Player");
        assert_eq!(info.property_display, "MonoBehaviour.speed: 1 vs 2");
    }
}
