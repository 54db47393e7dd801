mod support;

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use pixclass::features::{FeatureCalculator, compose};
use pixclass::imaging::{Resolution, TileSource};
use pixclass::overlay::{
    OverlayEvent, PredictionOverlay, TileCache, TileComputer, TileGrid, TileKey, TileStatus,
    TileWorkerPool,
};
use support::fixtures::two_tone_image;
use support::fixtures::IMAGE_SIDE;
use support::sources::{GatedSource, RecordingSource};

const WAIT: Duration = Duration::from_secs(10);

fn feature_at(source: &dyn TileSource, downsample: f64) -> TileComputer {
    let resolution = Resolution::custom(source.calibration(), downsample).unwrap();
    let operator = compose(Some(&FeatureCalculator::default_multiscale()), &resolution).unwrap();
    TileComputer::feature(operator, 0, &source.channel_names())
}

fn ready_for(events: &Receiver<OverlayEvent>, generation: u64) -> Vec<OverlayEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events.recv_timeout(WAIT).expect("overlay event");
        let done = matches!(
            event,
            OverlayEvent::TileReady { generation: g, .. } if g == generation
        );
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[test]
fn superseded_tile_never_lands_in_the_cache() {
    let (started_tx, started_rx) = mpsc::channel();
    let gated = Arc::new(GatedSource::new(two_tone_image(), started_tx));
    let source: Arc<dyn TileSource> = gated.clone();
    let cache = TileCache::new(64);
    let (events_tx, events_rx) = mpsc::channel();
    let overlay = PredictionOverlay::new(
        source.clone(),
        cache.clone(),
        Arc::new(TileWorkerPool::new(1)),
        16,
        Some(events_tx),
    );

    let old = feature_at(source.as_ref(), 1.0);
    let old_id = old.id();
    assert!(overlay.install(Some(old), 1));
    let tile = TileKey::new(0, 0, 0);
    assert!(matches!(overlay.request(tile, 1), TileStatus::Pending));
    started_rx.recv_timeout(WAIT).expect("first read started");

    let new = feature_at(source.as_ref(), 2.0);
    let new_id = new.id();
    assert_ne!(old_id, new_id);
    assert!(overlay.install(Some(new), 2));
    assert!(matches!(overlay.request(tile, 1), TileStatus::Unavailable));
    gated.open();

    assert!(matches!(overlay.request(tile, 2), TileStatus::Pending));
    let seen = ready_for(&events_rx, 2);
    assert!(seen.iter().all(|event| !matches!(
        event,
        OverlayEvent::TileReady { generation: 1, .. } | OverlayEvent::TileFailed { .. }
    )));
    assert!(cache.generations_for(old_id).is_empty());
    assert_eq!(cache.generations_for(new_id), vec![2]);
    match overlay.request(tile, 2) {
        TileStatus::Ready(data) => assert_eq!(data.dim(), (16, 16, 1)),
        other => panic!("expected a ready tile, got {other:?}"),
    }
}

#[test]
fn older_generations_cannot_be_reinstalled() {
    let source: Arc<dyn TileSource> = Arc::new(two_tone_image());
    let overlay = PredictionOverlay::new(
        source.clone(),
        TileCache::new(8),
        Arc::new(TileWorkerPool::new(1)),
        16,
        None,
    );
    assert!(overlay.install(Some(feature_at(source.as_ref(), 1.0)), 5));
    assert!(!overlay.install(Some(feature_at(source.as_ref(), 2.0)), 4));
    assert_eq!(overlay.generation(), 5);
    assert_eq!(overlay.computer().unwrap().resolution().downsample, 1.0);
}

#[test]
fn overlays_sharing_a_cache_keep_their_own_tiles() {
    let source: Arc<dyn TileSource> = Arc::new(two_tone_image());
    let cache = TileCache::new(64);
    let pool = Arc::new(TileWorkerPool::new(2));
    let (a_tx, a_rx) = mpsc::channel();
    let (b_tx, b_rx) = mpsc::channel();
    let a = PredictionOverlay::new(source.clone(), cache.clone(), pool.clone(), 16, Some(a_tx));
    let b = PredictionOverlay::new(source.clone(), cache.clone(), pool, 16, Some(b_tx));

    let fine = feature_at(source.as_ref(), 1.0);
    let coarse = feature_at(source.as_ref(), 2.0);
    let (fine_id, coarse_id) = (fine.id(), coarse.id());
    a.install(Some(fine), 1);
    b.install(Some(coarse), 1);

    let tile = TileKey::new(0, 1, 1);
    a.request(tile, 1);
    b.request(tile, 1);
    ready_for(&a_rx, 1);
    ready_for(&b_rx, 1);
    assert_eq!(cache.len(), 2);

    // Clearing one overlay leaves the other's tiles alone.
    a.install(None, 2);
    assert!(cache.generations_for(fine_id).is_empty());
    assert_eq!(cache.generations_for(coarse_id), vec![1]);
    assert!(matches!(b.request(tile, 1), TileStatus::Ready(_)));
    assert!(matches!(a.request(tile, 2), TileStatus::Unavailable));
}

#[test]
fn coarse_tiles_read_no_more_than_a_base_tile() {
    let recording = Arc::new(RecordingSource::new(two_tone_image()));
    let source: Arc<dyn TileSource> = recording.clone();
    let (events_tx, events_rx) = mpsc::channel();
    let overlay = PredictionOverlay::new(
        source.clone(),
        TileCache::new(64),
        Arc::new(TileWorkerPool::new(2)),
        16,
        Some(events_tx),
    );
    overlay.install(Some(feature_at(source.as_ref(), 1.0)), 1);

    overlay.request(TileKey::new(0, 0, 0), 1);
    ready_for(&events_rx, 1);
    let base_read = recording.largest_read();
    assert!(base_read >= 16 * 16);

    recording.reset();
    let coarse = TileKey::new(3, 0, 0);
    assert!(matches!(overlay.request(coarse, 1), TileStatus::Pending));
    ready_for(&events_rx, 1);
    assert!(recording.largest_read() <= base_read);
    // Sixteen base tiles cover the image; one was already cached.
    assert_eq!(recording.reads(), 15);

    let merged = overlay.cached_tile(&coarse).expect("coarse tile cached");
    assert_eq!(merged.dim(), (16, 16, 1));
    let inside = IMAGE_SIDE / 8;
    for r in 0..inside {
        for c in 0..inside {
            let (row, col) = (r * 8, c * 8);
            let base = overlay
                .cached_tile(&TileKey::new(0, (col / 16) as i64, (row / 16) as i64))
                .expect("base tile cached");
            assert_eq!(merged[[r, c, 0]], base[[row % 16, col % 16, 0]]);
        }
    }
    assert!(merged[[inside, 0, 0]].is_nan());
    assert!(merged[[0, inside, 0]].is_nan());

    assert!(matches!(
        overlay.request(TileKey::new(TileGrid::MAX_LEVEL + 1, 0, 0), 1),
        TileStatus::NoData
    ));
}
