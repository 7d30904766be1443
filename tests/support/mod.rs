use chronofold::{
    EntityKey, FieldMapping, FieldValue, Interval, Record, ResolutionReport, StatusLabel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::{Date, Duration, Month};

#[allow(dead_code)]
pub fn fields() -> FieldMapping {
    FieldMapping::new("START_DATE", "END_DATE").with_entity("ENTITY_ID")
}

#[allow(dead_code)]
pub fn jan(day: u8) -> Date {
    Date::from_calendar_date(2024, Month::January, day).expect("valid january date")
}

/// Axis instant of a calendar date.
#[allow(dead_code)]
pub fn day(date: Date) -> i64 {
    FieldValue::Date(date).instant().expect("date instant").1
}

#[allow(dead_code)]
pub fn span(start: Date, end: Date) -> Interval {
    Interval::new(day(start), day(end)).expect("non-empty span")
}

#[allow(dead_code)]
pub fn dated(entity: &str, start: Date, end: Date, tag: &str) -> Record {
    Record::new()
        .with("ENTITY_ID", entity)
        .with("START_DATE", start)
        .with("END_DATE", end)
        .with("TAG", tag)
}

/// Surviving spans of `entity`, sorted by start.
#[allow(dead_code)]
pub fn survivors(report: &ResolutionReport, entity: &str) -> Vec<(Interval, StatusLabel, String)> {
    let entity = EntityKey::from(entity);
    let mut spans: Vec<_> = report
        .records_for(&entity)
        .map(|r| {
            let tag = r
                .record
                .payload
                .get("TAG")
                .map(ToString::to_string)
                .unwrap_or_default();
            (r.record.interval, r.status, tag)
        })
        .collect();
    spans.sort_by_key(|(interval, _, _)| *interval);
    spans
}

/// Random dated records over `entities` entities, with heavy overlap.
#[allow(dead_code)]
pub fn random_records(seed: u64, entities: usize, per_entity: usize) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let origin = jan(1);
    let mut records = Vec::with_capacity(entities * per_entity);
    for n in 0..per_entity {
        for entity in 0..entities {
            let start = rng.random_range(0..120_i64);
            let length = rng.random_range(1..45_i64);
            records.push(
                Record::new()
                    .with("ENTITY_ID", format!("entity-{entity}"))
                    .with("START_DATE", origin + Duration::days(start))
                    .with("END_DATE", origin + Duration::days(start + length))
                    .with("TAG", format!("{entity}-{n}"))
                    .with("AMOUNT", rng.random_range(0..1_000_i64)),
            );
        }
    }
    records
}

/// Panics when two surviving intervals of one entity overlap.
#[allow(dead_code)]
pub fn assert_non_overlapping(report: &ResolutionReport) {
    let overlap = chronofold::resolver::first_overlap(
        report
            .records
            .iter()
            .map(|r| (&r.record.entity, r.record.interval)),
    );
    assert!(overlap.is_none(), "overlapping survivors: {overlap:?}");
}
