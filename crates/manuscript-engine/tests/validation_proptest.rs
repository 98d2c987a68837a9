use proptest::prelude::*;
use proptest::sample::Index;
use manuscript_engine::config::{parse_pipeline_str, validate_pipeline};

/// A document line and, for a required field, the error expected once the
/// line is removed. List items open with a bare `-` so any field line can
/// go without breaking the YAML structure.
type Line = (&'static str, Option<&'static str>);

const HEADER: &[Line] = &[
    ("name: prop_demo", Some("pipeline: missing required field 'name'")),
    ("specVersion: v1.0.0", Some("pipeline: missing required field 'specVersion'")),
    ("parallelism: 1", Some("pipeline: missing required field 'parallelism'")),
    ("sources:", None),
    ("  -", None),
    ("    name: events", Some("sources[0]: missing required field 'name'")),
    ("    dataset: zkevm.blocks", Some("sources[0] 'events': missing required field 'dataset'")),
    ("    timecol: ts", Some("sources[0] 'events': missing required field 'timecol'")),
    ("    size: 10min", Some("sources[0] 'events': missing required field 'size'")),
];

const TUMBLE: &[Line] = &[(
    "    type: tumble_window_dataset",
    Some("sources[0] 'events': missing required field 'type'"),
)];

const HOP: &[Line] = &[
    (
        "    type: hop_window_dataset",
        Some("sources[0] 'events': missing required field 'type'"),
    ),
    ("    slide: 5min", Some("sources[0] 'events': missing required field 'slide'")),
];

const CUMULATE: &[Line] = &[
    (
        "    type: cumulative_window_dataset",
        Some("sources[0] 'events': missing required field 'type'"),
    ),
    ("    step: 1min", Some("sources[0] 'events': missing required field 'step'")),
];

const REST: &[Line] = &[
    ("transforms:", None),
    ("  -", None),
    ("    name: big_events", Some("transforms[0]: missing required field 'name'")),
    ("    sql: SELECT * FROM events", Some("transforms[0] 'big_events': missing required field 'sql'")),
    ("sinks:", None),
    ("  -", None),
    ("    name: out", Some("sinks[0]: missing required field 'name'")),
    ("    type: postgres", Some("sinks[0] 'out': missing required field 'type'")),
    ("    from: big_events", Some("sinks[0] 'out': missing required field 'from'")),
    ("    database: analytics", Some("sinks[0] 'out': missing required field 'database'")),
    ("    schema: public", Some("sinks[0] 'out': missing required field 'schema'")),
    ("    table: big_events", Some("sinks[0] 'out': missing required field 'table'")),
    ("    primary_key: [id]", Some("sinks[0] 'out': missing required field 'primary_key'")),
    ("    config:", None),
    ("      host: localhost", Some("sinks[0] 'out': missing required field 'config.host'")),
    ("      username: writer", Some("sinks[0] 'out': missing required field 'config.username'")),
    ("      password: secret", Some("sinks[0] 'out': missing required field 'config.password'")),
];

const WINDOWS: [&[Line]; 3] = [TUMBLE, HOP, CUMULATE];

fn lines(window: &[Line]) -> Vec<Line> {
    HEADER.iter().chain(window).chain(REST).copied().collect()
}

fn document(window: &[Line], skip: Option<usize>) -> String {
    lines(window)
        .iter()
        .enumerate()
        .filter(|(i, _)| skip != Some(*i))
        .map(|(_, (line, _))| format!("{line}\n"))
        .collect()
}

#[test]
fn complete_documents_validate() {
    for window in WINDOWS {
        let raw = parse_pipeline_str(&document(window, None)).expect("generated yaml must parse");
        let spec = validate_pipeline(raw).expect("complete document must validate");
        assert_eq!(spec.name, "prop_demo");
        assert_eq!(spec.sinks.len(), 1);
    }
}

proptest! {
    #[test]
    fn removing_a_required_field_names_it(window in 0..WINDOWS.len(), pick in any::<Index>()) {
        let window = WINDOWS[window];
        let required: Vec<(usize, &str)> = lines(window)
            .into_iter()
            .enumerate()
            .filter_map(|(i, (_, expected))| expected.map(|e| (i, e)))
            .collect();
        let (skip, expected) = required[pick.index(required.len())];

        let raw = parse_pipeline_str(&document(window, Some(skip))).expect("generated yaml must parse");
        let err = validate_pipeline(raw).expect_err("missing field must fail");
        prop_assert!(
            err.to_string().contains(expected),
            "expected '{expected}', got: {err}"
        );
    }

    #[test]
    fn parallelism_must_be_positive(parallelism in -3_i64..4) {
        let yaml = document(TUMBLE, None).replace("parallelism: 1", &format!("parallelism: {parallelism}"));
        let raw = parse_pipeline_str(&yaml).expect("generated yaml must parse");
        let result = validate_pipeline(raw);
        if parallelism >= 1 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}
