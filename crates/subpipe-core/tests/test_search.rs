mod common;

use std::rc::Rc;

use common::{StubDetector, Stubs};
use subpipe_core::detection::{coordinate_catalog_path, find_objects, SearchConfig, SearchStatus};
use subpipe_core::io::catalog::count_rows;
use tempfile::tempdir;

fn search_config() -> SearchConfig {
    SearchConfig {
        start_threshold: 25.0,
        min_objects: 20,
        max_objects: 85,
        max_attempts: 20,
        ..Default::default()
    }
}

#[test]
fn test_overshoot_is_corrected_and_converges() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("img.fits");
    let stubs = Stubs::new();
    stubs.detector.borrow_mut().counts = [120, 15, 40].into();
    let detector = StubDetector(Rc::clone(&stubs.detector));

    let result = find_objects(&detector, &image, &search_config(), dir.path()).unwrap();

    let thresholds: Vec<f64> = stubs.detector.borrow().calls.iter().map(|c| c.1).collect();
    assert_eq!(thresholds, vec![25.0, 30.0, 28.0]);
    assert_eq!(result.threshold, 28.0);
    assert_eq!(result.object_count, 40);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.status, SearchStatus::Converged);
}

#[test]
fn test_catalog_count_and_threshold_are_consistent() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("img.fits");
    let stubs = Stubs::new();
    stubs.detector.borrow_mut().counts = [300, 200, 90, 50].into();
    let detector = StubDetector(Rc::clone(&stubs.detector));

    let result = find_objects(&detector, &image, &search_config(), dir.path()).unwrap();

    assert_eq!(result.catalog, coordinate_catalog_path(&image));
    assert_eq!(count_rows(&result.catalog).unwrap(), result.object_count);
    let last_call = stubs.detector.borrow().calls.last().cloned().unwrap();
    assert_eq!(last_call.1, result.threshold);
    assert_eq!(result.threshold, 40.0);
}

#[test]
fn test_floor_stops_lowering_threshold() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("img.fits");
    let stubs = Stubs::new();
    stubs.detector.borrow_mut().default_count = 3;
    let detector = StubDetector(Rc::clone(&stubs.detector));
    let config = SearchConfig {
        start_threshold: 12.0,
        ..search_config()
    };

    let result = find_objects(&detector, &image, &config, dir.path()).unwrap();

    // 12 -> 10 -> 8; the next step would fall below the floor.
    assert_eq!(result.status, SearchStatus::FloorReached);
    assert_eq!(result.threshold, 8.0);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.object_count, 3);
    assert!(!result.status.is_reliable());
}

#[test]
fn test_low_start_threshold_still_steps_up() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("img.fits");
    let stubs = Stubs::new();
    stubs.detector.borrow_mut().counts = [200, 50].into();
    let detector = StubDetector(Rc::clone(&stubs.detector));
    let config = SearchConfig {
        start_threshold: 2.0,
        ..search_config()
    };

    let result = find_objects(&detector, &image, &config, dir.path()).unwrap();

    let thresholds: Vec<f64> = stubs.detector.borrow().calls.iter().map(|c| c.1).collect();
    assert_eq!(thresholds, vec![2.0, 7.0]);
    assert_eq!(result.status, SearchStatus::Converged);
    assert_eq!(result.threshold, 7.0);
    assert_eq!(result.object_count, 50);
}

#[test]
fn test_attempt_budget_is_respected() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("img.fits");
    let stubs = Stubs::new();
    stubs.detector.borrow_mut().default_count = 500;
    let detector = StubDetector(Rc::clone(&stubs.detector));
    let config = SearchConfig {
        max_attempts: 4,
        ..search_config()
    };

    let result = find_objects(&detector, &image, &config, dir.path()).unwrap();

    assert_eq!(result.status, SearchStatus::AttemptsExhausted);
    assert_eq!(stubs.detector.borrow().calls.len(), 4);
    assert_eq!(result.threshold, 40.0);
    assert_eq!(count_rows(&result.catalog).unwrap(), 500);
}

#[test]
fn test_detector_failure_propagates() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("img.fits");
    let stubs = Stubs::new();
    stubs.detector.borrow_mut().fail = true;
    let detector = StubDetector(Rc::clone(&stubs.detector));

    let err = find_objects(&detector, &image, &search_config(), dir.path()).unwrap_err();
    assert!(err.to_string().contains("detector"));
}

#[test]
fn test_search_status_display() {
    assert_eq!(SearchStatus::Converged.to_string(), "Converged");
    assert_eq!(
        SearchStatus::FloorReached.to_string(),
        "Threshold floor reached"
    );
}
