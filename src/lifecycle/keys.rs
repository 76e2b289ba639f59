//! Deterministic storage keys for route × viewport baselines.

use crate::db::models::Viewport;

pub const BASELINE_PREFIX: &str = "baselines/";

const ROOT_ROUTE: &str = "root";

/// `/`-separated route to a flat key segment. Every leading and trailing
/// underscore is trimmed, including ones that were part of the route, so
/// `/_private` and `/private` collide, as do `/a_b` and `/a/b`. There is no
/// guard against it.
pub fn sanitize_route(route: &str) -> String {
    let replaced = route.replace('/', "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        ROOT_ROUTE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `baselines/{sanitizedRoute}_{width}x{height}.png`
pub fn get_baseline_key(route: &str, viewport: Viewport) -> String {
    format!(
        "{BASELINE_PREFIX}{}_{}x{}.png",
        sanitize_route(route),
        viewport.width,
        viewport.height
    )
}

pub fn is_baseline_image(key: &str) -> bool {
    key.starts_with(BASELINE_PREFIX) && key.ends_with(".png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_route_key() {
        assert_eq!(
            get_baseline_key("/dashboard/settings", Viewport::new(1920, 1080)),
            "baselines/dashboard_settings_1920x1080.png"
        );
    }

    #[test]
    fn root_route_maps_to_root() {
        assert_eq!(
            get_baseline_key("/", Viewport::new(375, 667)),
            "baselines/root_375x667.png"
        );
        assert_eq!(sanitize_route(""), "root");
        assert_eq!(sanitize_route("///"), "root");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(sanitize_route("/about/"), "about");
    }

    #[test]
    fn route_underscores_at_the_edges_are_trimmed_too() {
        assert_eq!(sanitize_route("/_private"), "private");
        assert_eq!(sanitize_route("/__drafts__/"), "drafts");
        assert_eq!(sanitize_route("/_private"), sanitize_route("/private"));
        assert_eq!(sanitize_route("/a__b"), "a__b");
        assert_eq!(
            get_baseline_key("/_private", Viewport::new(375, 667)),
            "baselines/private_375x667.png"
        );
    }

    #[test]
    fn slash_and_underscore_routes_collide() {
        assert_eq!(sanitize_route("/a_b"), sanitize_route("/a/b"));
    }

    #[test]
    fn only_png_under_prefix_counts_as_baseline() {
        assert!(is_baseline_image("baselines/root_375x667.png"));
        assert!(!is_baseline_image("baselines/index.json"));
        assert!(!is_baseline_image("baseline-images/ab/abcd.png"));
    }
}
