//! Matching cost at real screen sizes

mod common;

use std::time::Instant;

use common::{noise, with_patch};
use sightclick::{ExecuteOptions, Matcher, ScaleResolver, Template};

#[test]
fn test_uncached_720p_miss_fits_in_step_timeout() {
    let frame = noise(1280, 720, 1);
    let template = Template::new("banner", noise(120, 50, 2));
    let mut resolver = ScaleResolver::new();
    assert_eq!(resolver.candidates(template.id()).len(), 9);

    let started = Instant::now();
    let result = Matcher::new().find(&template, &frame, &mut resolver, 0.8);
    let elapsed = started.elapsed();

    assert!(!result.found);
    let budget = ExecuteOptions::default().timeout_per_step;
    assert!(elapsed < budget, "full search took {:?}", elapsed);
}

#[test]
fn test_720p_hit_at_expected_scale() {
    let banner = noise(120, 50, 3);
    let frame = with_patch(&noise(1280, 720, 4), &banner, 700, 400);
    let template = Template::new("banner", banner);
    let mut resolver = ScaleResolver::new();
    resolver.observe_window_size(Some((1280, 720)));

    let result = Matcher::new().find(&template, &frame, &mut resolver, 0.8);
    assert!(result.found);
    assert_eq!((result.x, result.y), (700, 400));
    assert_eq!(result.scale, 1.0);
    assert_eq!(resolver.cached(template.id()), Some(1.0));
}
