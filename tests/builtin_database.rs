use terminfo_text::{
    BUILTIN_TERM, ExpandContext, Terminal,
    expand::ErrorKind,
    parse::{Terminfo, parse},
};

static PARAM_VALUES: [i32; 6] = [0, 1, 10, -1, 255, 256];

fn builtin() -> Terminal {
    Terminal::builtin().unwrap()
}

fn evaluate(name: &str, params: &[i32]) -> Vec<u8> {
    builtin().evaluate(name, params).unwrap().unwrap()
}

/// Number of parameters a capability reads
fn param_count(cap: &[u8]) -> usize {
    let mut count = 0;
    for (index, window) in cap.windows(3).enumerate() {
        if window[0] == b'%'
            && window[1] == b'p'
            && window[2].is_ascii_digit()
            && (index == 0 || cap[index - 1] != b'%')
        {
            count = count.max(usize::from(window[2] - b'0'));
        }
    }
    if cap.windows(2).any(|window| window == b"%i") {
        count = count.max(2);
    }
    count
}

/// All combinations of `PARAM_VALUES` for `count` parameters
fn param_grid(count: usize) -> Vec<Vec<i32>> {
    let mut grid = vec![vec![]];
    for _ in 0..count.min(4) {
        grid = grid
            .into_iter()
            .flat_map(|params| {
                PARAM_VALUES.iter().map(move |value| {
                    let mut params = params.clone();
                    params.push(*value);
                    params
                })
            })
            .collect();
    }
    grid
}

#[test]
fn builtin_entry() {
    let terminal = builtin();
    let terminfo = terminal.terminfo();
    assert_eq!(terminfo.names, [BUILTIN_TERM, "xterm with 256 colors"]);
    assert!(terminfo.get_flag("am"));
    assert!(terminfo.get_flag("xenl"));
    assert_eq!(terminfo.get_number("cols"), Some(80));
    assert_eq!(terminfo.get_number("lines"), Some(24));
    assert_eq!(terminfo.get_number("pairs"), Some(0x10000));
    assert_eq!(terminfo.get_string("kf63"), Some(b"\x1b[1;4R".as_slice()));
}

#[test]
fn no_unresolved_escapes() {
    for (name, value) in &builtin().terminfo().strings {
        assert!(!value.contains(&b'^'), "caret left in {name}");
        assert!(
            !value.windows(2).any(|window| window == b"\\E"),
            "\\E left in {name}"
        );
    }
}

#[test]
fn plain_capabilities() {
    let terminal = builtin();
    let tests: [(&str, &[u8]); 8] = [
        ("bel", b"\x07"),
        ("cub1", b"\x08"),
        ("kbs", b"\x7f"),
        ("ht", b"\t"),
        ("clear", b"\x1b[H\x1b[2J"),
        ("oc", b"\x1b]104\x07"),
        ("flash", b"\x1b[?5h$<100/>\x1b[?5l"),
        ("kmous", b"\x1b[<"),
    ];
    for (name, expected) in tests {
        assert_eq!(terminal.get_capability(name), Some(expected), "{name}");
    }
}

#[test]
fn parameterized_capabilities() {
    let tests: [(&str, &[i32], &[u8]); 16] = [
        ("cup", &[3, 7], b"\x1b[4;8H"),
        ("cup", &[0, 0], b"\x1b[1;1H"),
        ("csr", &[0, 23], b"\x1b[1;24r"),
        ("hpa", &[9], b"\x1b[10G"),
        ("cub", &[5], b"\x1b[5D"),
        ("setaf", &[1], b"\x1b[31m"),
        ("setaf", &[9], b"\x1b[91m"),
        ("setaf", &[100], b"\x1b[38;5;100m"),
        ("setab", &[2], b"\x1b[42m"),
        ("sgr", &[], b"\x1b(B\x1b[0m"),
        ("sgr", &[0, 0, 0, 0, 0, 1, 0, 0, 1], b"\x1b(0\x1b[0;1m"),
        ("initc", &[1, 1000, 0, 500], b"\x1b]4;1;rgb:FF/00/7F\x1b\\"),
        ("rep", &[65, 3], b"A\x1b[2b"),
        ("smglr", &[0, 79], b"\x1b[?69h\x1b[1;80s"),
        ("smgrp", &[79], b"\x1b[?69h\x1b[;80s"),
        ("u6", &[4, 9], b"\x1b[10;5R"),
    ];
    for (name, params, expected) in tests {
        assert_eq!(evaluate(name, params), expected, "{name} {params:?}");
    }
}

#[test]
fn rep_nul_character() {
    assert_eq!(evaluate("rep", &[0, 3]), b"\x80\x1b[2b");
    assert_eq!(evaluate("rep", &[256, 3]), b"");
}

#[test]
fn unsupported_operator() {
    let err = builtin().evaluate("u8", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownOperator('['));
    assert_eq!(err.offset, 3);
}

#[test]
fn all_capabilities_expand() {
    let terminal = builtin();
    for (name, cap) in &terminal.terminfo().strings {
        if name == "u8" {
            continue;
        }
        for params in param_grid(param_count(cap)) {
            let first = terminal.evaluate(name, &params);
            let second = terminal.evaluate(name, &params);
            assert!(first.is_ok(), "{name} {params:?}: {first:?}");
            assert_eq!(first, second, "{name} {params:?}");
        }
    }
}

#[test]
fn shared_context() {
    let terminal = builtin();
    let mut context = ExpandContext::new();
    for name in ["cup", "setaf", "sgr"] {
        assert_eq!(
            terminal.evaluate_with(&mut context, name, &[1, 2]),
            terminal.evaluate(name, &[1, 2])
        );
    }
}

#[test]
fn exclude_from_builtin() {
    let source = include_str!("../data/xterm-256color.ti");
    let full = Terminfo::parse(source).unwrap();
    let terminfo = parse(source, &["u8", "acsc"]).unwrap();
    assert_eq!(terminfo.strings.len(), full.strings.len() - 2);
    assert_eq!(terminfo.get_string("u8"), None);
}
