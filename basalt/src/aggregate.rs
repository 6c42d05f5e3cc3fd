//! Grouped aggregation: the aggregate operator and its per-type
//! aggregators.

use crate::errors::ExecutionError;
use crate::executor::{Executor, TupleIterator};
use std::collections::HashMap;
use std::fmt;
use strata::{Field, FieldType, Tuple, TupleDesc};

/// The supported aggregate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        write!(f, "{name}")
    }
}

/// Folds integer fields into per-group aggregates.
///
/// Each group tracks how many tuples it has merged and one accumulated
/// value: the running min, max or sum, depending on the operator. Avg
/// accumulates a sum and divides on readout with integer truncation.
pub struct IntegerAggregator {
    group_by: Option<usize>,
    field: usize,
    op: AggregateOp,
    out_desc: TupleDesc,
    counts: HashMap<Field, i32>,
    values: HashMap<Field, i32>,
}

impl IntegerAggregator {
    /// `out_desc` is the schema of the emitted result tuples: `(INT)`
    /// without grouping, `(group type, INT)` with it.
    pub fn new(
        group_by: Option<usize>,
        field: usize,
        op: AggregateOp,
        out_desc: TupleDesc,
    ) -> IntegerAggregator {
        IntegerAggregator {
            group_by,
            field,
            op,
            out_desc,
            counts: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Merges one tuple into its group.
    pub fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        let group = self.group_key(tuple)?;
        let value = match tuple.field(self.field) {
            Some(Field::Int(v)) => *v,
            _ => {
                return Err(ExecutionError::SchemaMismatch(format!(
                    "integer aggregate over non-int field {}",
                    self.field
                )))
            }
        };
        match self.counts.get_mut(&group) {
            None => {
                self.counts.insert(group.clone(), 1);
                self.values.insert(group, value);
            }
            Some(count) => {
                *count += 1;
                if let Some(acc) = self.values.get_mut(&group) {
                    match self.op {
                        AggregateOp::Sum | AggregateOp::Avg => *acc += value,
                        AggregateOp::Max => *acc = (*acc).max(value),
                        AggregateOp::Min => *acc = (*acc).min(value),
                        AggregateOp::Count => {}
                    }
                }
            }
        }
        Ok(())
    }

    fn group_key(&self, tuple: &Tuple) -> Result<Field, ExecutionError> {
        match self.group_by {
            None => Ok(Field::Int(0)),
            Some(g) => tuple.field(g).cloned().ok_or_else(|| {
                ExecutionError::SchemaMismatch(format!("group-by field {g} is out of range"))
            }),
        }
    }

    /// The per-group results as a materialized executor. Zero merged
    /// tuples yield an empty stream.
    pub fn into_results(self) -> Result<TupleIterator, ExecutionError> {
        let mut tuples = Vec::with_capacity(self.counts.len());
        for (group, count) in &self.counts {
            let value = self.values.get(group).copied().unwrap_or(0);
            let out = match self.op {
                AggregateOp::Min | AggregateOp::Max | AggregateOp::Sum => value,
                AggregateOp::Count => *count,
                AggregateOp::Avg => value / *count,
            };
            let fields = match self.group_by {
                None => vec![Field::Int(out)],
                Some(_) => vec![group.clone(), Field::Int(out)],
            };
            tuples.push(Tuple::new(self.out_desc.clone(), fields)?);
        }
        Ok(TupleIterator::new(self.out_desc, tuples))
    }
}

/// Counts string fields per group. `Count` is the only operator strings
/// support; anything else is rejected at construction.
pub struct StringAggregator {
    group_by: Option<usize>,
    field: usize,
    out_desc: TupleDesc,
    counts: HashMap<Field, i32>,
    ungrouped_count: i32,
}

impl StringAggregator {
    pub fn new(
        group_by: Option<usize>,
        field: usize,
        op: AggregateOp,
        out_desc: TupleDesc,
    ) -> Result<StringAggregator, ExecutionError> {
        if op != AggregateOp::Count {
            return Err(ExecutionError::UnsupportedAggregate(format!(
                "string fields only support count, got {op}"
            )));
        }
        Ok(StringAggregator {
            group_by,
            field,
            out_desc,
            counts: HashMap::new(),
            ungrouped_count: 0,
        })
    }

    /// Merges one tuple into its group.
    pub fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        if !matches!(tuple.field(self.field), Some(Field::Str(_))) {
            return Err(ExecutionError::SchemaMismatch(format!(
                "string aggregate over non-string field {}",
                self.field
            )));
        }
        match self.group_by {
            None => self.ungrouped_count += 1,
            Some(g) => {
                let group = tuple.field(g).cloned().ok_or_else(|| {
                    ExecutionError::SchemaMismatch(format!("group-by field {g} is out of range"))
                })?;
                *self.counts.entry(group).or_insert(0) += 1;
            }
        }
        Ok(())
    }

    /// The counts as a materialized executor. With no grouping this is a
    /// single `(total,)` tuple even when nothing was merged.
    pub fn into_results(self) -> Result<TupleIterator, ExecutionError> {
        let mut tuples = Vec::new();
        match self.group_by {
            None => {
                tuples.push(Tuple::new(
                    self.out_desc.clone(),
                    vec![Field::Int(self.ungrouped_count)],
                )?);
            }
            Some(_) => {
                for (group, count) in &self.counts {
                    tuples.push(Tuple::new(
                        self.out_desc.clone(),
                        vec![group.clone(), Field::Int(*count)],
                    )?);
                }
            }
        }
        Ok(TupleIterator::new(self.out_desc, tuples))
    }
}

/// Computes one aggregate over one column, optionally grouped by another.
///
/// The child is drained in a single pass on the first open; the
/// materialized per-group results are then served, and rewind replays them
/// without re-aggregating.
pub struct Aggregate {
    child: Box<dyn Executor>,
    field: usize,
    group_by: Option<usize>,
    op: AggregateOp,
    field_type: FieldType,
    out_desc: TupleDesc,
    results: Option<TupleIterator>,
}

impl Aggregate {
    /// Fails when `field` or `group_by` fall outside the child's schema,
    /// or when the operator is undefined for the field's type.
    pub fn new(
        child: Box<dyn Executor>,
        field: usize,
        group_by: Option<usize>,
        op: AggregateOp,
    ) -> Result<Aggregate, ExecutionError> {
        let child_desc = child.tuple_desc();
        let field_type = child_desc.field_type(field).ok_or_else(|| {
            ExecutionError::SchemaMismatch(format!("aggregate field {field} is out of range"))
        })?;
        if field_type == FieldType::Str && op != AggregateOp::Count {
            return Err(ExecutionError::UnsupportedAggregate(format!(
                "string fields only support count, got {op}"
            )));
        }

        // No grouping: one INT column named after the operator. Grouping:
        // the child's group column name, then its aggregate column name.
        let out_desc = match group_by {
            None => TupleDesc::new(vec![FieldType::Int], vec![Some(op.to_string())]),
            Some(g) => {
                let group_type = child_desc.field_type(g).ok_or_else(|| {
                    ExecutionError::SchemaMismatch(format!("group-by field {g} is out of range"))
                })?;
                TupleDesc::new(
                    vec![group_type, FieldType::Int],
                    vec![
                        child_desc.field_name(g).map(|n| n.to_string()),
                        child_desc.field_name(field).map(|n| n.to_string()),
                    ],
                )
            }
        };

        Ok(Aggregate {
            child,
            field,
            group_by,
            op,
            field_type,
            out_desc,
            results: None,
        })
    }

    fn materialize(&mut self) -> Result<TupleIterator, ExecutionError> {
        match self.field_type {
            FieldType::Int => {
                let mut agg = IntegerAggregator::new(
                    self.group_by,
                    self.field,
                    self.op,
                    self.out_desc.clone(),
                );
                while let Some(tuple) = self.child.fetch_next()? {
                    agg.merge(&tuple)?;
                }
                agg.into_results()
            }
            FieldType::Str => {
                let mut agg = StringAggregator::new(
                    self.group_by,
                    self.field,
                    self.op,
                    self.out_desc.clone(),
                )?;
                while let Some(tuple) = self.child.fetch_next()? {
                    agg.merge(&tuple)?;
                }
                agg.into_results()
            }
        }
    }
}

impl Executor for Aggregate {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()?;
        if self.results.is_none() {
            let results = self.materialize()?;
            self.results = Some(results);
        }
        if let Some(results) = &mut self.results {
            results.open()?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        if let Some(results) = &mut self.results {
            results.close();
        }
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        match &mut self.results {
            Some(results) => results.rewind(),
            None => Err(ExecutionError::NotOpen),
        }
    }

    fn tuple_desc(&self) -> TupleDesc {
        self.out_desc.clone()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        match &mut self.results {
            Some(results) => results.fetch_next(),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pair_desc() -> TupleDesc {
        TupleDesc::new(
            vec![FieldType::Int, FieldType::Int],
            vec![Some("g".to_string()), Some("v".to_string())],
        )
    }

    fn pair_rows(rows: &[(i32, i32)]) -> TupleIterator {
        let desc = pair_desc();
        let tuples = rows
            .iter()
            .map(|(g, v)| Tuple::new(desc.clone(), vec![Field::Int(*g), Field::Int(*v)]).unwrap())
            .collect();
        TupleIterator::new(desc, tuples)
    }

    fn grouped_int_results(agg: IntegerAggregator) -> HashSet<(i32, i32)> {
        let mut iter = agg.into_results().unwrap();
        iter.open().unwrap();
        let mut out = HashSet::new();
        while let Some(t) = iter.fetch_next().unwrap() {
            let Some(Field::Int(g)) = t.field(0) else {
                panic!("expected int group");
            };
            let Some(Field::Int(v)) = t.field(1) else {
                panic!("expected int value");
            };
            out.insert((*g, *v));
        }
        out
    }

    fn grouped_out_desc() -> TupleDesc {
        TupleDesc::unnamed(vec![FieldType::Int, FieldType::Int])
    }

    fn merge_pairs(agg: &mut IntegerAggregator, rows: &[(i32, i32)]) {
        let desc = pair_desc();
        for (g, v) in rows {
            let t = Tuple::new(desc.clone(), vec![Field::Int(*g), Field::Int(*v)]).unwrap();
            agg.merge(&t).unwrap();
        }
    }

    #[test]
    fn integer_aggregator_folds_each_operator() {
        let rows = [(1, 10), (1, 20), (2, 30)];

        let mut sum =
            IntegerAggregator::new(Some(0), 1, AggregateOp::Sum, grouped_out_desc());
        merge_pairs(&mut sum, &rows);
        assert_eq!(grouped_int_results(sum), HashSet::from([(1, 30), (2, 30)]));

        let mut min =
            IntegerAggregator::new(Some(0), 1, AggregateOp::Min, grouped_out_desc());
        merge_pairs(&mut min, &rows);
        assert_eq!(grouped_int_results(min), HashSet::from([(1, 10), (2, 30)]));

        let mut max =
            IntegerAggregator::new(Some(0), 1, AggregateOp::Max, grouped_out_desc());
        merge_pairs(&mut max, &rows);
        assert_eq!(grouped_int_results(max), HashSet::from([(1, 20), (2, 30)]));

        let mut count =
            IntegerAggregator::new(Some(0), 1, AggregateOp::Count, grouped_out_desc());
        merge_pairs(&mut count, &rows);
        assert_eq!(grouped_int_results(count), HashSet::from([(1, 2), (2, 1)]));
    }

    #[test]
    fn ungrouped_avg_truncates_toward_zero() {
        let out_desc = TupleDesc::unnamed(vec![FieldType::Int]);
        let mut agg = IntegerAggregator::new(None, 1, AggregateOp::Avg, out_desc);
        merge_pairs(&mut agg, &[(0, 10), (0, 20), (0, 30)]);

        let mut iter = agg.into_results().unwrap();
        iter.open().unwrap();
        let t = iter.fetch_next().unwrap().unwrap();
        assert_eq!(t.field(0), Some(&Field::Int(20)));
        assert!(iter.fetch_next().unwrap().is_none());
    }

    #[test]
    fn ungrouped_integer_aggregate_over_nothing_is_empty() {
        let out_desc = TupleDesc::unnamed(vec![FieldType::Int]);
        let agg = IntegerAggregator::new(None, 1, AggregateOp::Sum, out_desc);
        let mut iter = agg.into_results().unwrap();
        iter.open().unwrap();
        assert!(iter.fetch_next().unwrap().is_none());
    }

    #[test]
    fn string_aggregator_rejects_everything_but_count() {
        let out_desc = TupleDesc::unnamed(vec![FieldType::Int]);
        for op in [
            AggregateOp::Min,
            AggregateOp::Max,
            AggregateOp::Sum,
            AggregateOp::Avg,
        ] {
            assert!(matches!(
                StringAggregator::new(None, 0, op, out_desc.clone()),
                Err(ExecutionError::UnsupportedAggregate(_))
            ));
        }
        assert!(StringAggregator::new(None, 0, AggregateOp::Count, out_desc).is_ok());
    }

    #[test]
    fn ungrouped_string_count_emits_a_row_even_for_empty_input() {
        let out_desc = TupleDesc::unnamed(vec![FieldType::Int]);
        let agg = StringAggregator::new(None, 0, AggregateOp::Count, out_desc).unwrap();
        let mut iter = agg.into_results().unwrap();
        iter.open().unwrap();
        let t = iter.fetch_next().unwrap().unwrap();
        assert_eq!(t.field(0), Some(&Field::Int(0)));
    }

    #[test]
    fn grouped_string_count_tallies_each_group() {
        let desc = TupleDesc::unnamed(vec![FieldType::Str]);
        let out_desc = TupleDesc::unnamed(vec![FieldType::Str, FieldType::Int]);
        let mut agg = StringAggregator::new(Some(0), 0, AggregateOp::Count, out_desc).unwrap();
        for name in ["a", "b", "a", "a"] {
            let t = Tuple::new(desc.clone(), vec![Field::Str(name.to_string())]).unwrap();
            agg.merge(&t).unwrap();
        }

        let mut iter = agg.into_results().unwrap();
        iter.open().unwrap();
        let mut out = HashSet::new();
        while let Some(t) = iter.fetch_next().unwrap() {
            let Some(Field::Str(g)) = t.field(0) else {
                panic!("expected string group");
            };
            let Some(Field::Int(n)) = t.field(1) else {
                panic!("expected int count");
            };
            out.insert((g.clone(), *n));
        }
        assert_eq!(
            out,
            HashSet::from([("a".to_string(), 3), ("b".to_string(), 1)])
        );
    }

    #[test]
    fn aggregate_operator_names_its_output_columns() {
        let ungrouped =
            Aggregate::new(Box::new(pair_rows(&[])), 1, None, AggregateOp::Sum).unwrap();
        let desc = ungrouped.tuple_desc();
        assert_eq!(desc.num_fields(), 1);
        assert_eq!(desc.field_name(0), Some("sum"));

        let grouped =
            Aggregate::new(Box::new(pair_rows(&[])), 1, Some(0), AggregateOp::Sum).unwrap();
        let desc = grouped.tuple_desc();
        assert_eq!(desc.num_fields(), 2);
        assert_eq!(desc.field_name(0), Some("g"));
        assert_eq!(desc.field_name(1), Some("v"));
    }

    #[test]
    fn aggregate_operator_rejects_non_count_over_strings() {
        let desc = TupleDesc::unnamed(vec![FieldType::Str]);
        let child = TupleIterator::new(desc, Vec::new());
        assert!(matches!(
            Aggregate::new(Box::new(child), 0, None, AggregateOp::Sum),
            Err(ExecutionError::UnsupportedAggregate(_))
        ));
    }

    #[test]
    fn aggregate_rewind_replays_without_reaggregating() {
        let mut agg = Aggregate::new(
            Box::new(pair_rows(&[(1, 10), (1, 20), (2, 30)])),
            1,
            Some(0),
            AggregateOp::Sum,
        )
        .unwrap();
        agg.open().unwrap();

        let mut first = Vec::new();
        while let Some(t) = agg.fetch_next().unwrap() {
            first.push(t);
        }
        agg.rewind().unwrap();
        let mut second = Vec::new();
        while let Some(t) = agg.fetch_next().unwrap() {
            second.push(t);
        }
        agg.close();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }
}
