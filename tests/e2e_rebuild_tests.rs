//! End-to-end tests for timeline rebuilds
//!
//! Imports overlapping exports into an on-disk database, rebuilds, and checks
//! what readers of the canonical tables see.

mod common;

use common::{
    at, date, listen, TestTimeline, ARTIST_1, ARTIST_2, HISTORY_0, HISTORY_1, TRACK_1, TRACK_2,
    TRACK_3,
};
use listening_timeline::history::{CanonicalListenRecord, RawListenEntry};
use listening_timeline::{CalendarQuery, PipelineStage, RebuildReport, TimelineError, TimelineStore};

/// Two exports downloaded three months apart that share part of their history.
fn import_overlapping_exports(timeline: &TestTimeline, spring_first: bool) {
    let spring = || {
        timeline.import(
            "2021-spring",
            Some(date(2021, 3, 31)),
            &[(
                HISTORY_0,
                vec![
                    listen(at(2021, 3, 1, 8, 0, 0), ARTIST_1, TRACK_1, 200_000),
                    listen(at(2021, 3, 1, 8, 3, 20), ARTIST_1, TRACK_2, 180_000),
                    listen(at(2021, 3, 2, 21, 0, 0), ARTIST_2, TRACK_3, 240_000),
                ],
            )],
        )
    };
    let summer = || {
        timeline.import(
            "2021-summer",
            Some(date(2021, 6, 30)),
            &[
                (
                    HISTORY_0,
                    vec![
                        listen(at(2021, 3, 1, 8, 3, 20), ARTIST_1, TRACK_2, 180_000),
                        listen(at(2021, 3, 2, 21, 0, 0), ARTIST_2, TRACK_3, 240_000),
                        // Skipped after 5 seconds, ends the same second as the line above
                        listen(at(2021, 3, 2, 21, 0, 0), ARTIST_1, TRACK_1, 5_000),
                    ],
                ),
                (
                    HISTORY_1,
                    vec![
                        listen(at(2021, 3, 5, 10, 0, 0), ARTIST_1, TRACK_1, 200_000),
                        // Played again right away
                        listen(at(2021, 3, 5, 10, 3, 20), ARTIST_1, TRACK_1, 200_000),
                    ],
                ),
            ],
        )
    };
    if spring_first {
        spring();
        summer();
    } else {
        summer();
        spring();
    }
}

fn all_listens(store: &dyn TimelineStore) -> Vec<CanonicalListenRecord> {
    store.get_listens(0, 10_000).unwrap()
}

#[test]
fn test_overlapping_exports_merge_into_one_timeline() {
    let timeline = TestTimeline::new();
    import_overlapping_exports(&timeline, true);

    let report = timeline.rebuilder().rebuild().unwrap();

    assert_eq!(
        report,
        RebuildReport {
            raw_records: 8,
            canonical_records: 6,
            duplicates_collapsed: 2,
            placeholders_skipped: 0,
            calendar_days: 5,
            listen_days: 3,
            missing_days: 0,
            anomalies_corrected: 0,
        }
    );

    let listens = all_listens(timeline.store.as_ref());
    let summary: Vec<(i64, &str, &str, i64)> = listens
        .iter()
        .map(|l| {
            (
                l.position,
                l.artist_name.as_str(),
                l.track_name.as_str(),
                l.ms_played,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, ARTIST_1, TRACK_1, 200_000),
            (1, ARTIST_1, TRACK_2, 180_000),
            // Same instant: the export whose file starts earlier goes first
            (2, ARTIST_2, TRACK_3, 240_000),
            (3, ARTIST_1, TRACK_1, 5_000),
            (4, ARTIST_1, TRACK_1, 200_000),
            (5, ARTIST_1, TRACK_1, 200_000),
        ]
    );
}

#[test]
fn test_rebuild_twice_gives_identical_output() {
    let timeline = TestTimeline::new();
    import_overlapping_exports(&timeline, true);
    let rebuilder = timeline.rebuilder();

    rebuilder.rebuild().unwrap();
    let first_listens = serde_json::to_string(&all_listens(timeline.store.as_ref())).unwrap();
    let first_calendar =
        serde_json::to_string(&timeline.store.get_calendar(&CalendarQuery::all()).unwrap())
            .unwrap();

    rebuilder.rebuild().unwrap();
    let second_listens = serde_json::to_string(&all_listens(timeline.store.as_ref())).unwrap();
    let second_calendar =
        serde_json::to_string(&timeline.store.get_calendar(&CalendarQuery::all()).unwrap())
            .unwrap();

    assert_eq!(first_listens, second_listens);
    assert_eq!(first_calendar, second_calendar);
}

#[test]
fn test_import_order_does_not_change_timeline() {
    let spring_first = TestTimeline::new();
    import_overlapping_exports(&spring_first, true);
    spring_first.rebuilder().rebuild().unwrap();

    let summer_first = TestTimeline::new();
    import_overlapping_exports(&summer_first, false);
    summer_first.rebuilder().rebuild().unwrap();

    assert_eq!(
        all_listens(spring_first.store.as_ref()),
        all_listens(summer_first.store.as_ref())
    );
}

#[test]
fn test_failed_rebuild_keeps_previous_timeline() {
    let timeline = TestTimeline::new();
    import_overlapping_exports(&timeline, true);
    timeline.rebuilder().rebuild().unwrap();
    let listens_before = all_listens(timeline.store.as_ref());
    let calendar_before = timeline.store.get_calendar(&CalendarQuery::all()).unwrap();

    let broken = RawListenEntry {
        end_time: None,
        ..listen(at(2021, 7, 1, 12, 0, 0), ARTIST_2, TRACK_3, 1_000)
    };
    let batch = timeline.import(
        "2021-broken",
        None,
        &[(
            HISTORY_0,
            vec![listen(at(2021, 7, 1, 11, 0, 0), ARTIST_2, TRACK_3, 1_000), broken],
        )],
    );

    let err = timeline.rebuilder().rebuild().unwrap_err();

    assert_eq!(err.stage(), PipelineStage::Validation);
    match &err {
        TimelineError::MalformedRecord {
            source_file_id,
            position,
            ..
        } => {
            let file = timeline
                .store
                .list_source_files()
                .unwrap()
                .into_iter()
                .find(|f| f.id == *source_file_id)
                .unwrap();
            assert_eq!(file.batch_id, batch.id);
            assert_eq!(*position, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(all_listens(timeline.store.as_ref()), listens_before);
    assert_eq!(
        timeline.store.get_calendar(&CalendarQuery::all()).unwrap(),
        calendar_before
    );
}

#[test]
fn test_placeholders_are_counted_but_not_numbered() {
    let timeline = TestTimeline::new();
    let unresolved = RawListenEntry {
        track_name: None,
        ..listen(at(2021, 3, 1, 9, 0, 0), ARTIST_1, "", 1_000)
    };
    timeline.import(
        "2021-spring",
        Some(date(2021, 3, 31)),
        &[(
            HISTORY_0,
            vec![
                listen(at(2021, 3, 1, 8, 0, 0), ARTIST_1, TRACK_1, 200_000),
                unresolved,
                listen(at(2021, 3, 1, 10, 0, 0), ARTIST_1, TRACK_2, 200_000),
            ],
        )],
    );

    let report = timeline.rebuilder().rebuild().unwrap();

    assert_eq!(report.raw_records, 3);
    assert_eq!(report.placeholders_skipped, 1);
    assert_eq!(report.canonical_records, 2);
    let positions: Vec<i64> = all_listens(timeline.store.as_ref())
        .iter()
        .map(|l| l.position)
        .collect();
    assert_eq!(positions, vec![0, 1]);
}

#[test]
fn test_second_connection_sees_committed_timeline() {
    let timeline = TestTimeline::new();
    import_overlapping_exports(&timeline, true);
    let reader = timeline.open_reader();
    assert_eq!(reader.count_listens().unwrap(), 0);

    timeline.rebuilder().rebuild().unwrap();

    assert_eq!(reader.count_listens().unwrap(), 6);
    assert_eq!(
        reader.get_calendar(&CalendarQuery::listened()).unwrap().len(),
        3
    );
}

#[test]
fn test_rebuild_of_empty_database_is_empty() {
    let timeline = TestTimeline::new();

    let report = timeline.rebuilder().rebuild().unwrap();

    assert_eq!(report, RebuildReport::default());
    assert_eq!(timeline.store.count_listens().unwrap(), 0);
    assert!(timeline
        .store
        .get_calendar(&CalendarQuery::all())
        .unwrap()
        .is_empty());
}

#[test]
fn test_listen_queries_after_rebuild() {
    let timeline = TestTimeline::new();
    import_overlapping_exports(&timeline, true);
    timeline.rebuilder().rebuild().unwrap();

    let march_2 = timeline
        .store
        .get_listens_between(date(2021, 3, 2), date(2021, 3, 2))
        .unwrap();
    assert_eq!(
        march_2.iter().map(|l| l.position).collect::<Vec<_>>(),
        vec![2, 3]
    );

    let by_artist = timeline.store.get_listens_by_artist(ARTIST_2).unwrap();
    assert_eq!(by_artist.len(), 1);

    let by_track = timeline
        .store
        .get_listens_by_track(ARTIST_1, TRACK_1)
        .unwrap();
    assert_eq!(
        by_track.iter().map(|l| l.position).collect::<Vec<_>>(),
        vec![0, 3, 4, 5]
    );
}
