use std::collections::BTreeSet;

use chronofold::config::ConsolidationConfig;
use chronofold::partition::PartitionOutcome;
use chronofold::priority::RANK_FIELD;
use chronofold::{
    resolve, Consolidator, Direction, EntityKey, FieldValue, PartitionDriver, Ranker, Record,
    ResolveError, StatusKey, StatusLabel,
};

mod support;

use support::{assert_non_overlapping, dated, fields, jan, random_records, span, survivors};

fn run(records: Vec<Record>, ranker: &Ranker) -> chronofold::ResolutionReport {
    resolve(records, "START_DATE", "END_DATE", Some("ENTITY_ID"), ranker)
}

#[test]
fn random_inputs_never_leave_overlaps() {
    for seed in 0..12 {
        for direction in [Direction::Ascending, Direction::Descending] {
            let records = random_records(seed, 6, 25);
            let report = run(records, &Ranker::default().with_direction(direction));
            assert!(report.is_complete());
            assert_eq!(report.stats.partitions, 6);
            assert_non_overlapping(&report);
        }
    }
}

#[test]
fn every_input_and_survivor_has_a_status() {
    let records = random_records(7, 4, 30);
    let inputs: Vec<(EntityKey, i64, i64)> = records
        .iter()
        .map(|r| {
            let entity = EntityKey::from_value(r.get("ENTITY_ID").unwrap()).unwrap();
            let start = r.get("START_DATE").unwrap().instant().unwrap().1;
            let end = r.get("END_DATE").unwrap().instant().unwrap().1;
            (entity, start, end)
        })
        .collect();
    let report = run(records, &Ranker::default());

    let audited: BTreeSet<(EntityKey, i64, i64)> = report
        .statuses
        .keys()
        .map(|key| (key.entity.clone(), key.start, key.end))
        .collect();
    for input in &inputs {
        assert!(audited.contains(input), "no status for {input:?}");
    }

    let mut survivor_keys = BTreeSet::new();
    for survivor in &report.records {
        assert!(matches!(
            survivor.status,
            StatusLabel::AddedRetained | StatusLabel::TrimmedStart | StatusLabel::TrimmedEnd
        ));
        assert_eq!(report.statuses.get(&survivor.status_key), Some(&survivor.status));
        assert!(survivor_keys.insert(survivor.status_key.clone()));
    }
    assert_eq!(
        report.stats.statuses.added_retained + report.stats.statuses.trimmed_start,
        report
            .records
            .iter()
            .filter(|r| r.status != StatusLabel::TrimmedEnd)
            .count()
    );
}

#[test]
fn disjoint_input_is_returned_unchanged() {
    let records = vec![
        dated("a", jan(1), jan(5), "a1"),
        dated("a", jan(5), jan(9), "a2"),
        dated("b", jan(3), jan(20), "b1"),
        dated("a", jan(12), jan(15), "a3"),
    ];
    let report = run(records.clone(), &Ranker::default());

    assert!(report
        .statuses
        .values()
        .all(|label| *label == StatusLabel::AddedRetained));
    assert_eq!(report.statuses.len(), 4);

    let mut output: Vec<(usize, Record)> = report
        .records
        .iter()
        .map(|r| (r.record.source, r.record.payload.clone()))
        .collect();
    output.sort_by_key(|(source, _)| *source);
    let output: Vec<Record> = output.into_iter().map(|(_, record)| record).collect();
    assert_eq!(output, records);
}

#[test]
fn identical_bounds_are_fully_subsumed() {
    let report = run(
        vec![dated("E", jan(1), jan(10), "A"), dated("E", jan(1), jan(10), "B")],
        &Ranker::default(),
    );

    assert_eq!(
        survivors(&report, "E"),
        vec![(span(jan(1), jan(10)), StatusLabel::AddedRetained, "B".to_string())]
    );
    let entity = EntityKey::from("E");
    let labels: Vec<_> = report.statuses.iter().map(|(k, v)| (k.instance, *v)).collect();
    assert_eq!(
        labels,
        vec![
            (0, StatusLabel::RemovedFullySubsumed),
            (1, StatusLabel::AddedRetained)
        ]
    );
    assert!(report
        .statuses
        .keys()
        .all(|key| key.entity == entity && key.interval() == span(jan(1), jan(10))));
}

#[test]
fn inner_overlap_splits_the_earlier_record() {
    let report = run(
        vec![dated("E", jan(1), jan(20), "A"), dated("E", jan(5), jan(10), "B")],
        &Ranker::default(),
    );

    assert_eq!(
        survivors(&report, "E"),
        vec![
            (span(jan(1), jan(5)), StatusLabel::TrimmedEnd, "A".to_string()),
            (span(jan(5), jan(10)), StatusLabel::AddedRetained, "B".to_string()),
            (span(jan(10), jan(20)), StatusLabel::TrimmedStart, "A".to_string()),
        ]
    );

    // Trimmed End is audited against the bounds before the trim.
    let trimmed = StatusKey::new(EntityKey::from("E"), span(jan(1), jan(20)), 0);
    assert_eq!(report.statuses.get(&trimmed), Some(&StatusLabel::TrimmedEnd));
    assert_eq!(report.statuses.len(), 3);
    assert_non_overlapping(&report);
}

#[test]
fn overlap_at_start_removes_the_earlier_record() {
    let report = run(
        vec![dated("E", jan(1), jan(10), "A"), dated("E", jan(1), jan(5), "B")],
        &Ranker::default(),
    );

    assert_eq!(
        survivors(&report, "E"),
        vec![
            (span(jan(1), jan(5)), StatusLabel::AddedRetained, "B".to_string()),
            (span(jan(5), jan(10)), StatusLabel::TrimmedStart, "A".to_string()),
        ]
    );
    let removed = StatusKey::new(EntityKey::from("E"), span(jan(1), jan(10)), 0);
    assert_eq!(
        report.statuses.get(&removed),
        Some(&StatusLabel::RemovedOverlappedStart)
    );
}

#[test]
fn entities_resolve_independently() {
    let x = random_records(3, 1, 40)
        .into_iter()
        .map(|r| r.with("ENTITY_ID", "X"))
        .collect::<Vec<_>>();
    let y = random_records(4, 1, 40)
        .into_iter()
        .map(|r| r.with("ENTITY_ID", "Y"))
        .collect::<Vec<_>>();

    let together = run(x.iter().chain(y.iter()).cloned().collect(), &Ranker::default());
    let alone_x = run(x, &Ranker::default());
    let alone_y = run(y, &Ranker::default());

    for (alone, name) in [(&alone_x, "X"), (&alone_y, "Y")] {
        let entity = EntityKey::from(name);
        let spans = |report: &chronofold::ResolutionReport| {
            report
                .records_for(&entity)
                .map(|r| (r.record.interval, r.status, r.record.payload.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(spans(&together), spans(alone));
        let statuses = |report: &chronofold::ResolutionReport| {
            report
                .statuses
                .iter()
                .filter(|(key, _)| key.entity == entity)
                .map(|(key, label)| (key.start, key.end, *label))
                .collect::<Vec<_>>()
        };
        assert_eq!(statuses(&together), statuses(alone));
    }
}

#[test]
fn descending_order_lets_the_earliest_record_win() {
    let records = vec![dated("E", jan(1), jan(20), "A"), dated("E", jan(5), jan(10), "B")];
    let report = run(records, &Ranker::default().with_direction(Direction::Descending));

    assert_eq!(
        survivors(&report, "E"),
        vec![(span(jan(1), jan(20)), StatusLabel::AddedRetained, "A".to_string())]
    );
    assert_eq!(report.stats.statuses.removed_fully_subsumed, 1);
}

#[test]
fn strict_ranking_fails_only_the_ambiguous_entity() {
    let records = vec![
        dated("tied", jan(1), jan(10), "A"),
        dated("clear", jan(1), jan(10), "C"),
        dated("tied", jan(1), jan(10), "B"),
    ];
    let report = run(records, &Ranker::default().strict(true));

    assert!(!report.is_complete());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, &EntityKey::from("tied"));
    assert_eq!(
        failures[0].1,
        &ResolveError::AmbiguousPriority {
            entity: EntityKey::from("tied"),
            first: 0,
            second: 2,
        }
    );
    assert_eq!(survivors(&report, "clear").len(), 1);
    assert!(survivors(&report, "tied").is_empty());
}

#[test]
fn invalid_records_fail_their_partition_only() {
    let records = vec![
        dated("bad", jan(10), jan(1), "reversed"),
        dated("good", jan(1), jan(10), "ok"),
        Record::new().with("START_DATE", jan(1)).with("END_DATE", jan(2)),
        dated("empty", jan(3), jan(3), "zero"),
    ];
    let report = run(records, &Ranker::default());

    assert_eq!(report.stats.failed_partitions, 2);
    assert_eq!(report.stats.unassigned_records, 1);
    assert_eq!(
        report.unassigned[0],
        ResolveError::MissingField {
            record: 2,
            field: "ENTITY_ID".to_string()
        }
    );
    for (_, error) in report.failures() {
        assert!(matches!(error, ResolveError::InvalidInterval { .. }));
    }
    assert_eq!(survivors(&report, "good").len(), 1);

    let outcome = report
        .partitions
        .iter()
        .find(|p| p.entity == EntityKey::from("good"))
        .map(|p| p.outcome.clone());
    assert!(matches!(outcome, Some(PartitionOutcome::Resolved { records: 1, .. })));
}

#[test]
fn remainders_carry_their_own_payload_copy() {
    let original = dated("E", jan(1), jan(20), "A")
        .with("AMOUNT", 12.5)
        .with("NOTE", FieldValue::Null);
    let report = run(
        vec![original.clone(), dated("E", jan(5), jan(10), "B")],
        &Ranker::default(),
    );

    let entity = EntityKey::from("E");
    let pieces: Vec<_> = report
        .records_for(&entity)
        .filter(|r| r.record.source == 0)
        .collect();
    assert_eq!(pieces.len(), 2);
    for piece in pieces {
        assert_eq!(piece.record.payload.get("AMOUNT"), Some(&FieldValue::Float(12.5)));
        assert_eq!(piece.record.payload.get("NOTE"), Some(&FieldValue::Null));
        assert_eq!(piece.record.payload.get("TAG"), Some(&FieldValue::from("A")));
    }
}

#[test]
fn configured_consolidation_exports_inclusive_ends() {
    let mut config = ConsolidationConfig::default();
    config.fields = fields();
    config.boundary.status_field = Some("STATUS".to_string());
    let consolidator = Consolidator::from_config(&config).unwrap();

    let report = consolidator.run(vec![
        dated("E", jan(1), jan(20), "A"),
        dated("E", jan(5), jan(10), "B"),
    ]);
    let mut exported = consolidator.export(&report).unwrap();
    exported.sort_by_key(|r| r.get("START_DATE").map(ToString::to_string));

    let row = |start: time::Date, end: time::Date, status: &str| {
        (
            FieldValue::from(start),
            FieldValue::from(end),
            FieldValue::from(status),
        )
    };
    let rows: Vec<(FieldValue, FieldValue, FieldValue)> = exported
        .iter()
        .map(|r| {
            (
                r.get("START_DATE").cloned().unwrap(),
                r.get("END_DATE").cloned().unwrap(),
                r.get("STATUS").cloned().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            row(jan(1), jan(4), "Trimmed End"),
            row(jan(5), jan(9), "Added/Retained"),
            row(jan(10), jan(19), "Trimmed Start"),
        ]
    );

    let entries = consolidator.status_entries(&report);
    let json = serde_json::to_value(&entries).unwrap();
    assert_eq!(json[0]["entity"], "E");
    assert_eq!(json[0]["start"], "2024-01-01");
    assert_eq!(json[0]["end"], "2024-01-20");
    assert_eq!(json[0]["status"], "Trimmed End");
}

#[test]
fn rank_field_overrides_start_order() {
    let mut config = ConsolidationConfig::default();
    config.fields = fields();
    config.priority.policy = RANK_FIELD.to_string();
    config.priority.rank_field = Some("RANK".to_string());
    let ranker = config.ranker().unwrap();

    let records = vec![
        dated("E", jan(5), jan(10), "inner").with("RANK", 1_i64),
        dated("E", jan(1), jan(20), "outer").with("RANK", 0_i64),
    ];
    let report = run(records.clone(), &ranker);
    assert_eq!(survivors(&report, "E").len(), 3);

    let records = vec![
        dated("E", jan(5), jan(10), "inner").with("RANK", 0_i64),
        dated("E", jan(1), jan(20), "outer").with("RANK", 1_i64),
    ];
    let report = run(records, &ranker);
    assert_eq!(
        survivors(&report, "E"),
        vec![(span(jan(1), jan(20)), StatusLabel::AddedRetained, "outer".to_string())]
    );
}

#[test]
fn timestamps_resolve_on_their_own_axis() {
    let at = |hour: u8| {
        FieldValue::Timestamp(
            jan(1)
                .with_hms(hour, 0, 0)
                .unwrap()
                .assume_offset(time::UtcOffset::from_hms(2, 0, 0).unwrap()),
        )
    };
    let records = vec![
        Record::new().with("START_DATE", at(8)).with("END_DATE", at(18)),
        Record::new().with("START_DATE", at(12)).with("END_DATE", at(14)),
    ];
    let report = resolve(records, "START_DATE", "END_DATE", None, &Ranker::default());
    assert!(report.is_complete());
    assert_eq!(report.records.len(), 3);
    assert_non_overlapping(&report);
    assert_eq!(
        report.axes().get(&EntityKey::All),
        Some(&chronofold::TimeAxis::Timestamp)
    );

    let left = report
        .records
        .iter()
        .find(|r| r.status == StatusLabel::TrimmedEnd)
        .unwrap();
    let exported = left.record.to_record(&fields(), left.record.interval.start, left.record.interval.end);
    assert_eq!(exported.unwrap().get("END_DATE"), Some(&at(12)));
}

fn json_records(raw: &str) -> Vec<Record> {
    serde_json::from_str(raw).unwrap()
}

#[test]
fn sub_microsecond_timestamps_are_ordered_exactly() {
    let narrow = json_records(
        r#"[{"S": "2024-01-01T10:00:00.000000100Z", "E": "2024-01-01T10:00:00.000000900Z"}]"#,
    );
    let report = resolve(narrow, "S", "E", None, &Ranker::default());
    assert!(report.is_complete());
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].record.interval.len(), 800);

    let records = json_records(
        r#"[
            {"S": "2024-01-01T09:00:00Z", "E": "2024-01-01T10:00:00.000000900Z", "TAG": "A"},
            {"S": "2024-01-01T10:00:00.000000100Z", "E": "2024-01-01T11:00:00Z", "TAG": "B"}
        ]"#,
    );
    let report = resolve(records, "S", "E", None, &Ranker::default());
    assert!(report.is_complete());
    assert_non_overlapping(&report);

    let mut ordered: Vec<_> = report.records.iter().collect();
    ordered.sort_by_key(|r| r.record.interval);
    let labels: Vec<_> = ordered.iter().map(|r| r.status).collect();
    assert_eq!(labels, vec![StatusLabel::TrimmedEnd, StatusLabel::AddedRetained]);

    let mapping = chronofold::FieldMapping::new("S", "E");
    let left = &ordered[0].record;
    let written = left
        .to_record(&mapping, left.interval.start, left.interval.end)
        .unwrap();
    let right_start = FieldValue::from("2024-01-01T10:00:00.000000100Z").instant();
    assert_eq!(written.get("E").and_then(FieldValue::instant), right_start);
    assert_eq!(
        written.get("S"),
        Some(&FieldValue::from("2024-01-01T09:00:00Z"))
    );
}

#[test]
fn payload_text_survives_consolidation_verbatim() {
    let records = json_records(
        r#"[
            {"S": "2024-01-01", "E": "2024-01-20", "NOTE": "2024-01-01T10:00:00.500Z", "REF": "2024-01-05"},
            {"S": "2024-01-05", "E": "2024-01-10", "NOTE": "plain"}
        ]"#,
    );
    let report = resolve(records, "S", "E", None, &Ranker::default());
    assert!(report.is_complete());

    let mapping = chronofold::FieldMapping::new("S", "E");
    let mut ordered: Vec<_> = report.records.iter().collect();
    ordered.sort_by_key(|r| r.record.interval);
    let exported: Vec<serde_json::Value> = ordered
        .iter()
        .map(|r| {
            let record = r
                .record
                .to_record(&mapping, r.record.interval.start, r.record.interval.end)
                .unwrap();
            serde_json::to_value(record).unwrap()
        })
        .collect();

    assert_eq!(exported.len(), 3);
    for index in [0, 2] {
        assert_eq!(exported[index]["NOTE"], "2024-01-01T10:00:00.500Z");
        assert_eq!(exported[index]["REF"], "2024-01-05");
    }
    assert_eq!(exported[0]["S"], "2024-01-01");
    assert_eq!(exported[0]["E"], "2024-01-05");
    assert_eq!(exported[1]["NOTE"], "plain");
    assert_eq!(exported[2]["S"], "2024-01-10");
    assert_eq!(exported[2]["E"], "2024-01-20");
}

#[test]
fn parallel_driver_matches_sequential() {
    let records = random_records(11, 80, 6);
    let sequential = PartitionDriver::new(fields(), Ranker::default())
        .with_parallel_threshold(usize::MAX)
        .run(records.clone());
    let parallel = PartitionDriver::new(fields(), Ranker::default())
        .with_parallel_threshold(2)
        .run(records);
    assert_eq!(sequential.records, parallel.records);
    assert_eq!(sequential.statuses, parallel.statuses);
    assert_eq!(sequential.stats, parallel.stats);
}
