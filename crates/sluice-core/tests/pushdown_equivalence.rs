//! Property tests: pushing a filter down and re-checking locally returns the
//! same rows as evaluating the filter with no pushdown at all, and the fetch
//! loop emits exactly the requested row window.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use proptest::prelude::*;
use sluice_core::{
    extract, CancellationSignal, CompareOp, Comparison, FetchHints, FetchLoop, FilterExpr,
    FilterLiteral, FilterVocabulary, PageRequest, PageSource,
};

#[derive(Clone, Debug)]
struct TestRow {
    a: String,
    b: String,
    n: i64,
    tags: Vec<String>,
}

/// Remote side understands `a =`, `b =` and `tags contains`.
#[derive(Debug, Default)]
struct Vocabulary {
    a: Option<String>,
    b: Option<String>,
    tags: Vec<String>,
}

impl FilterVocabulary for Vocabulary {
    fn accept(&mut self, c: &Comparison) -> bool {
        match (c.field.as_str(), c.op, c.value.as_text()) {
            ("a", CompareOp::Eq, Some(v)) => self.a = Some(v.to_string()),
            ("b", CompareOp::Eq, Some(v)) => self.b = Some(v.to_string()),
            ("tags", CompareOp::Contains, Some(v)) => self.tags.push(v.to_string()),
            _ => return false,
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.a.is_none() && self.b.is_none() && self.tags.is_empty()
    }
}

impl Vocabulary {
    fn remote_matches(&self, row: &TestRow) -> bool {
        self.a.as_ref().map_or(true, |a| &row.a == a)
            && self.b.as_ref().map_or(true, |b| &row.b == b)
            && self.tags.iter().all(|t| row.tags.contains(t))
    }
}

fn eval(row: &TestRow, expr: &FilterExpr) -> bool {
    match expr {
        FilterExpr::And(l, r) => eval(row, l) && eval(row, r),
        FilterExpr::Or(l, r) => eval(row, l) || eval(row, r),
        FilterExpr::Not(inner) => !eval(row, inner),
        FilterExpr::Compare(c) => eval_compare(row, c),
        // Opaque predicate the remote never sees; depends on a local column.
        FilterExpr::Other => row.n % 2 == 0,
    }
}

fn eval_compare(row: &TestRow, c: &Comparison) -> bool {
    match (c.field.as_str(), &c.value) {
        ("a", FilterLiteral::Text(v)) => compare_text(&row.a, c.op, v),
        ("b", FilterLiteral::Text(v)) => compare_text(&row.b, c.op, v),
        ("n", FilterLiteral::Int(v)) => match c.op {
            CompareOp::Eq => row.n == *v,
            CompareOp::NotEq => row.n != *v,
            CompareOp::Lt => row.n < *v,
            CompareOp::LtEq => row.n <= *v,
            CompareOp::Gt => row.n > *v,
            CompareOp::GtEq => row.n >= *v,
            CompareOp::Contains | CompareOp::IsNull => false,
        },
        ("tags", FilterLiteral::Text(v)) => match c.op {
            CompareOp::Contains => row.tags.contains(v),
            _ => false,
        },
        _ => false,
    }
}

fn compare_text(left: &str, op: CompareOp, right: &str) -> bool {
    match op {
        CompareOp::Eq => left == right,
        CompareOp::NotEq => left != right,
        CompareOp::Lt => left < right,
        CompareOp::LtEq => left <= right,
        CompareOp::Gt => left > right,
        CompareOp::GtEq => left >= right,
        CompareOp::Contains => left.contains(right),
        CompareOp::IsNull => false,
    }
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![Just("x"), Just("y"), Just("z")].prop_map(str::to_string)
}

fn arb_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::NotEq),
        Just(CompareOp::Lt),
        Just(CompareOp::GtEq),
        Just(CompareOp::Contains),
    ]
}

fn arb_filter() -> impl Strategy<Value = FilterExpr> {
    let leaf = prop_oneof![
        (prop_oneof![Just("a"), Just("b"), Just("tags")], arb_op(), arb_text())
            .prop_map(|(f, op, v)| FilterExpr::compare(f, op, FilterLiteral::Text(v))),
        (arb_op(), 0i64..4).prop_map(|(op, v)| FilterExpr::compare("n", op, FilterLiteral::Int(v))),
        // Right field, wrong literal type.
        (arb_op(), 0i64..4).prop_map(|(op, v)| FilterExpr::compare("a", op, FilterLiteral::Int(v))),
        Just(FilterExpr::Other),
    ];

    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.and(r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.or(r)),
            inner.prop_map(FilterExpr::negate),
        ]
    })
}

fn arb_row() -> impl Strategy<Value = TestRow> {
    (
        arb_text(),
        arb_text(),
        0i64..4,
        prop::collection::vec(arb_text(), 0..3),
    )
        .prop_map(|(a, b, n, tags)| TestRow { a, b, n, tags })
}

fn local_only(rows: &[TestRow], filter: &FilterExpr) -> BTreeSet<usize> {
    (0..rows.len()).filter(|&i| eval(&rows[i], filter)).collect()
}

fn pushed_then_rechecked(rows: &[TestRow], filter: &FilterExpr) -> BTreeSet<usize> {
    let vocabulary: Vocabulary = extract(filter);
    (0..rows.len())
        .filter(|&i| vocabulary.remote_matches(&rows[i]))
        .filter(|&i| eval(&rows[i], filter))
        .collect()
}

proptest! {
    #[test]
    fn pushdown_never_drops_matching_rows(
        filter in arb_filter(),
        rows in prop::collection::vec(arb_row(), 0..24),
    ) {
        prop_assert_eq!(local_only(&rows, &filter), pushed_then_rechecked(&rows, &filter));
    }

    #[test]
    fn extraction_is_deterministic(filter in arb_filter()) {
        let first: Vocabulary = extract(&filter);
        let second: Vocabulary = extract(&filter);
        prop_assert_eq!(first.a, second.a);
        prop_assert_eq!(first.b, second.b);
        prop_assert_eq!(first.tags, second.tags);
    }
}

// ---------------------------------------------------------------------------
// Fetch window
// ---------------------------------------------------------------------------

/// `total` rows numbered from zero, served in pages.
#[derive(Debug)]
struct NumberedRows {
    total: usize,
    calls: Mutex<usize>,
}

#[async_trait]
impl PageSource for NumberedRows {
    type Item = usize;

    async fn fetch_page(
        &self,
        request: PageRequest,
        _cancel: &CancellationSignal,
    ) -> anyhow::Result<Vec<usize>> {
        *self.calls.lock().unwrap() += 1;
        let start = request.offset().min(self.total);
        let end = (start + request.page_size).min(self.total);
        Ok((start..end).collect())
    }
}

proptest! {
    #[test]
    fn fetch_emits_exact_window(
        total in 0usize..60,
        page_size in 1usize..12,
        skip in prop::option::of(0usize..70),
        take in prop::option::of(0usize..70),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let source = NumberedRows { total, calls: Mutex::new(0) };
        let (mut tx, mut rx) = tokio::sync::mpsc::channel::<Vec<usize>>(64);

        runtime.block_on(async {
            FetchLoop::new("numbers", &source, page_size)
                .with_hints(FetchHints { skip, take })
                .run(&mut tx)
                .await
                .unwrap();
        });
        drop(tx);

        let mut emitted = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.len() <= page_size);
            emitted.extend(chunk);
        }

        let start = skip.unwrap_or(0).min(total);
        let end = take.map_or(total, |t| (start + t).min(total));
        let expected: Vec<usize> = (start..end).collect();
        prop_assert_eq!(emitted, expected);

        if take == Some(0) {
            prop_assert_eq!(*source.calls.lock().unwrap(), 0);
        }
    }
}
