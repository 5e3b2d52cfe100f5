// context.rs - classify a scene path into a shot/asset/unclassified bucket
//
// Ordered regex patterns, shot before asset, case-insensitive. Path
// separators are normalized to `/` before matching.

use regex::RegexBuilder;

use crate::models::Context;

struct Pattern {
    regex: regex::Regex,
    build: fn(&regex::Captures) -> Context,
}

fn compiled(pattern: &str, build: fn(&regex::Captures) -> Context) -> Pattern {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static context pattern must compile");
    Pattern { regex, build }
}

fn shot_patterns() -> Vec<Pattern> {
    vec![
        compiled(
            r"scene/(?P<episode>ep\d+)/(?P<sequence>sq\d+)/(?P<shot>sh\d+)/(?P<department>\w+)",
            |c| Context::Shot {
                episode: c["episode"].to_string(),
                sequence: c["sequence"].to_string(),
                shot: c["shot"].to_string(),
                department: c["department"].to_string(),
            },
        ),
        // looser fallback: any three path segments under .../scene/ followed
        // by a department directory
        compiled(
            r"scene/(?P<episode>[^/]+)/(?P<sequence>[^/]+)/(?P<shot>[^/]+)/(?P<department>\w+)",
            |c| Context::Shot {
                episode: c["episode"].to_string(),
                sequence: c["sequence"].to_string(),
                shot: c["shot"].to_string(),
                department: c["department"].to_string(),
            },
        ),
    ]
}

fn asset_patterns() -> Vec<Pattern> {
    vec![
        compiled(
            r"asset/(?P<category>[^/]+)/(?P<subcategory>[^/]+)/(?P<asset>[^/]+)/(?P<department>\w+)",
            |c| Context::Asset {
                category: c["category"].to_string(),
                subcategory: c["subcategory"].to_string(),
                asset: c["asset"].to_string(),
                department: c["department"].to_string(),
            },
        ),
    ]
}

/// Classify `scene_path` into a [`Context`]. First match wins, shot patterns
/// before asset patterns; `Unclassified` when nothing matches.
pub fn detect(scene_path: &str) -> Context {
    let normalized = scene_path.replace('\\', "/");

    for pattern in shot_patterns() {
        if let Some(caps) = pattern.regex.captures(&normalized) {
            return (pattern.build)(&caps);
        }
    }
    for pattern in asset_patterns() {
        if let Some(caps) = pattern.regex.captures(&normalized) {
            return (pattern.build)(&caps);
        }
    }
    Context::Unclassified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_shot_context() {
        let ctx = detect("V:/SWA/all/scene/Ep01/sq010/SH0010/lighting/scene.ma");
        assert_eq!(
            ctx,
            Context::Shot {
                episode: "Ep01".into(),
                sequence: "sq010".into(),
                shot: "SH0010".into(),
                department: "lighting".into(),
            }
        );
    }

    #[test]
    fn detects_shot_context_with_backslashes() {
        let ctx = detect(r"V:\SWA\all\scene\Ep01\sq010\SH0010\lighting\scene.ma");
        assert!(matches!(ctx, Context::Shot { .. }));
    }

    #[test]
    fn detects_asset_context() {
        let ctx = detect("V:/SWA/all/asset/char/hero/superman/model/superman.ma");
        assert_eq!(
            ctx,
            Context::Asset {
                category: "char".into(),
                subcategory: "hero".into(),
                asset: "superman".into(),
                department: "model".into(),
            }
        );
    }

    #[test]
    fn unclassified_when_no_pattern_matches() {
        let ctx = detect("/tmp/random/path/scene.ma");
        assert_eq!(ctx, Context::Unclassified);
    }

    #[test]
    fn shot_pattern_wins_over_asset_when_both_could_loosely_match() {
        let ctx = detect("V:/SWA/all/scene/Ep01/sq010/SH0010/lighting/asset/x.ma");
        assert!(matches!(ctx, Context::Shot { .. }));
    }
}
