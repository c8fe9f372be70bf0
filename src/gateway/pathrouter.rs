//! HTTP path-router — spec.md §4.4.
//!
//! Built the way the teacher builds its axum sub-routers (a small, explicit
//! piece of state constructed once at startup) but with matching semantics
//! axum's own `Router` doesn't expose: `:name` segments are captured into a
//! parameter map, a trailing `*` matches any suffix, matching prefers the
//! most literal-specific pattern, and ties between equally specific patterns
//! are broken by registration order. Unknown paths are the caller's job to
//! turn into the spec's `404 {"error":"Not found"}` — this module only does
//! matching.

use std::collections::HashMap;

use axum::http::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s == "*" {
                Segment::Wildcard
            } else if let Some(name) = s.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

/// Score a candidate match: literal segments count more than param segments,
/// so `/api/status` outranks `/api/:name` for the same request path. Higher
/// is more specific.
fn match_segments(pattern: &[Segment], path: &[&str]) -> Option<(usize, HashMap<String, String>)> {
    let mut params = HashMap::new();
    let mut specificity = 0usize;

    for (pi, segment) in pattern.iter().enumerate() {
        match segment {
            Segment::Wildcard => {
                // Must be the last pattern segment; matches any (possibly empty) suffix.
                return Some((specificity, params));
            }
            Segment::Literal(lit) => {
                let actual = path.get(pi)?;
                if actual != lit {
                    return None;
                }
                specificity += 2;
            }
            Segment::Param(name) => {
                let actual = path.get(pi)?;
                params.insert(name.clone(), (*actual).to_string());
                specificity += 1;
            }
        }
    }

    if pattern.len() == path.len() {
        Some((specificity, params))
    } else {
        None
    }
}

struct Route<H> {
    method: Method,
    segments: Vec<Segment>,
    handler: H,
}

/// A registered set of `(method, pattern) -> H` routes plus the matcher
/// described above. `H` is typically a small enum naming the built-in
/// handler to dispatch to, keeping the router itself free of axum's handler
/// trait machinery.
pub struct PathRouter<H> {
    routes: Vec<Route<H>>,
}

pub struct Matched<'a, H> {
    pub handler: &'a H,
    pub params: HashMap<String, String>,
}

impl<H> PathRouter<H> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn register(&mut self, method: Method, pattern: &str, handler: H) {
        self.routes.push(Route { method, segments: parse_pattern(pattern), handler });
    }

    /// Find the best match for `method`/`path`. Among routes that match,
    /// prefer the most specific; ties go to whichever was registered first.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<Matched<'_, H>> {
        let path_segments = split_path(path);
        let mut best: Option<(usize, usize, HashMap<String, String>)> = None;

        for (index, route) in self.routes.iter().enumerate() {
            if &route.method != method {
                continue;
            }
            let Some((specificity, params)) = match_segments(&route.segments, &path_segments) else {
                continue;
            };
            let is_better = match &best {
                None => true,
                Some((best_specificity, _, _)) => specificity > *best_specificity,
            };
            if is_better {
                best = Some((specificity, index, params));
            }
        }

        best.map(|(_, index, params)| Matched { handler: &self.routes[index].handler, params })
    }
}

impl<H> Default for PathRouter<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Name {
        Health,
        Status,
        Webhook,
        ChannelByName,
        Catchall,
    }

    fn sample_router() -> PathRouter<Name> {
        let mut router = PathRouter::new();
        router.register(Method::GET, "/health", Name::Health);
        router.register(Method::GET, "/api/status", Name::Status);
        router.register(Method::POST, "/webhook", Name::Webhook);
        router.register(Method::GET, "/channels/:name", Name::ChannelByName);
        router.register(Method::GET, "/files/*", Name::Catchall);
        router
    }

    #[test]
    fn matches_a_literal_route() {
        let router = sample_router();
        let matched = router.match_route(&Method::GET, "/health").unwrap();
        assert_eq!(*matched.handler, Name::Health);
        assert!(matched.params.is_empty());
    }

    #[test]
    fn matches_a_param_route_and_extracts_it() {
        let router = sample_router();
        let matched = router.match_route(&Method::GET, "/channels/telegram").unwrap();
        assert_eq!(*matched.handler, Name::ChannelByName);
        assert_eq!(matched.params.get("name"), Some(&"telegram".to_string()));
    }

    #[test]
    fn wildcard_matches_any_suffix() {
        let router = sample_router();
        let matched = router.match_route(&Method::GET, "/files/a/b/c.png").unwrap();
        assert_eq!(*matched.handler, Name::Catchall);
    }

    #[test]
    fn unknown_path_does_not_match() {
        let router = sample_router();
        assert!(router.match_route(&Method::GET, "/nope").is_none());
    }

    #[test]
    fn wrong_method_does_not_match() {
        let router = sample_router();
        assert!(router.match_route(&Method::POST, "/health").is_none());
    }

    #[test]
    fn literal_route_outranks_param_route_for_the_same_path() {
        let mut router = PathRouter::new();
        router.register(Method::GET, "/api/:name", Name::ChannelByName);
        router.register(Method::GET, "/api/status", Name::Status);

        let matched = router.match_route(&Method::GET, "/api/status").unwrap();
        assert_eq!(*matched.handler, Name::Status);
    }

    #[test]
    fn ties_are_broken_by_registration_order() {
        let mut router = PathRouter::new();
        router.register(Method::GET, "/a/:x", Name::ChannelByName);
        router.register(Method::GET, "/:y/b", Name::Status);

        // Both patterns have one literal + one param segment against "/a/b" —
        // equal specificity, so the first-registered pattern wins.
        let matched = router.match_route(&Method::GET, "/a/b").unwrap();
        assert_eq!(*matched.handler, Name::ChannelByName);
    }
}
