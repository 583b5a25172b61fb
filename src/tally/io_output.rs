// Writing the result tables.

use std::io::Write;

use csv::Writer;
use trial_tally::pivot::slot_names;
use trial_tally::reconcile::Reconciliation;
use trial_tally::{AggregatedItem, ItemRow, Trial};

/// Floats keep a decimal point, as in `1.0`.
pub fn format_float(x: f64) -> String {
    format!("{:?}", x)
}

fn format_mean(x: Option<f64>) -> String {
    x.map(format_float).unwrap_or_default()
}

pub fn write_trials<'a, W, I>(wtr: &mut Writer<W>, trials: I) -> csv::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Trial>,
{
    wtr.write_record([
        "participant_id",
        "item_number",
        "classification",
        "elapsed_seconds",
        "timestamp",
    ])?;
    for t in trials {
        wtr.write_record([
            t.participant_id.clone(),
            t.item_number.to_string(),
            t.classification.clone(),
            format_float(t.elapsed_seconds),
            t.classified_at.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// One row per item: the majority of each group, then the classification
/// slots of all groups, then their times. Every group gets `quota` slots,
/// left blank when there is nobody or no answer at that rank.
pub fn write_wide<'a, W, I>(wtr: &mut Writer<W>, groups: &[&str], quota: usize, rows: I) -> csv::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ItemRow>,
{
    let mut header: Vec<String> = vec!["item_number".to_string()];
    for g in groups.iter() {
        header.push(format!("majority_{}", g));
        header.push(format!("count_{}", g));
    }
    for g in groups.iter() {
        header.extend((1..=quota).map(|r| slot_names(g, r).0));
    }
    for g in groups.iter() {
        header.extend((1..=quota).map(|r| slot_names(g, r).1));
    }
    wtr.write_record(&header)?;

    for row in rows {
        let slots: Vec<_> = groups.iter().map(|g| row.group(g)).collect();
        let mut record: Vec<String> = vec![row.item_number.to_string()];
        for s in slots.iter() {
            record.push(s.map(|s| s.majority().as_output().to_string()).unwrap_or_default());
            record.push(s.map(|s| s.tally.top_count().to_string()).unwrap_or_default());
        }
        for s in slots.iter() {
            record.extend((1..=quota).map(|r| {
                s.and_then(|s| s.rank(r))
                    .map(|v| v.classification.clone())
                    .unwrap_or_default()
            }));
        }
        for s in slots.iter() {
            record.extend((1..=quota).map(|r| {
                s.and_then(|s| s.rank(r))
                    .map(|v| format_float(v.elapsed_seconds))
                    .unwrap_or_default()
            }));
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Majority and counts per item, for one group.
pub fn write_aggregate<W: Write>(
    wtr: &mut Writer<W>,
    labels: &[String],
    items: &[AggregatedItem],
) -> csv::Result<()> {
    let mut header: Vec<String> = vec!["item_number".to_string(), "majority".to_string()];
    header.extend(labels.iter().map(|l| format!("total_{}", l)));
    header.push("total_votes".to_string());
    header.push("mean_elapsed".to_string());
    wtr.write_record(&header)?;

    for item in items.iter() {
        let mut record: Vec<String> = vec![
            item.item_number.to_string(),
            item.majority.as_output().to_string(),
        ];
        record.extend(labels.iter().map(|l| item.count_for(l).to_string()));
        record.push(item.total_votes.to_string());
        record.push(format_mean(item.mean_elapsed));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_removed_ties<W: Write>(
    wtr: &mut Writer<W>,
    labels: &[String],
    rec: &Reconciliation,
) -> csv::Result<()> {
    let (g1, g2) = (&rec.first_group, &rec.second_group);
    let mut header: Vec<String> = vec![
        "item_number".to_string(),
        format!("tie_flag_{}", g1),
        format!("tie_flag_{}", g2),
    ];
    header.extend(labels.iter().map(|l| format!("count_{}_{}", l, g1)));
    header.extend(labels.iter().map(|l| format!("count_{}_{}", l, g2)));
    wtr.write_record(&header)?;

    for r in rec.removed.iter() {
        let mut record: Vec<String> = vec![
            r.item_number.to_string(),
            r.tied_first.to_string(),
            r.tied_second.to_string(),
        ];
        record.extend(labels.iter().map(|l| r.first_count(l).to_string()));
        record.extend(labels.iter().map(|l| r.second_count(l).to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_double_ties<W: Write>(
    wtr: &mut Writer<W>,
    labels: &[String],
    rec: &Reconciliation,
) -> csv::Result<()> {
    let mut header: Vec<String> = vec!["item_number".to_string()];
    for g in [&rec.first_group, &rec.second_group] {
        header.push(format!("majority_{}", g));
        header.push(format!("total_votes_{}", g));
        header.extend(labels.iter().map(|l| format!("count_{}_{}", l, g)));
        header.push(format!("mean_elapsed_{}", g));
    }
    wtr.write_record(&header)?;

    for d in rec.double_ties.iter() {
        let mut record: Vec<String> = vec![d.item_number.to_string()];
        for item in [&d.first, &d.second] {
            record.push(item.majority.as_output().to_string());
            record.push(item.total_votes.to_string());
            record.extend(labels.iter().map(|l| item.count_for(l).to_string()));
            record.push(format_mean(item.mean_elapsed));
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
