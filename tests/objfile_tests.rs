//! Object-file round trips and link-time merging.

use std::fs;
use tadsc::compile::{compile_source, CompilerOptions};
use tadsc::objfile::loader::Linker;
use tadsc::objfile::LinkError;
use tadsc::symbol::SymKind;

fn object_bytes(source: &str) -> Vec<u8> {
    let out = compile_source("mod.t", source, CompilerOptions::default(), false);
    assert_eq!(out.exit_code, 0, "compile failed: {}", out.diagnostics);
    out.object_file.expect("object file")
}

fn symbol_bytes(source: &str) -> Vec<u8> {
    let out = compile_source("mod.t", source, CompilerOptions::default(), false);
    assert_eq!(out.exit_code, 0, "compile failed: {}", out.diagnostics);
    out.symbol_file.expect("symbol file")
}

fn lookup(linker: &Linker, name: &str) -> Option<SymKind> {
    let sym = linker.interner.lookup(name)?;
    let id = linker.syms.find_noref(sym)?;
    Some(linker.syms.entry(id).kind.clone())
}

#[test]
fn single_module_round_trip() {
    let bytes = object_bytes(
        "class Room: object;\nbigCave: Room;\nscore(points) { return points; }\n",
    );
    let mut linker = Linker::new();
    linker.load_module(&bytes).unwrap();
    linker.finish();
    assert_eq!(linker.log.error_count(), 0, "{:?}", linker.log.diagnostics());

    match lookup(&linker, "bigCave") {
        Some(SymKind::Object(o)) => {
            assert!(!o.is_class);
            assert!(!o.is_extern);
        }
        other => panic!("bigCave: {:?}", other),
    }
    match lookup(&linker, "Room") {
        Some(SymKind::Object(o)) => assert!(o.is_class),
        other => panic!("Room: {:?}", other),
    }
    match lookup(&linker, "score") {
        Some(SymKind::Func(f)) => {
            assert_eq!(f.argc, 1);
            assert!(f.defined);
        }
        other => panic!("score: {:?}", other),
    }
}

#[test]
fn extern_resolves_across_modules() {
    let user = object_bytes("extern function helper(a, b);\ncaller() { return helper(1, 2); }\n");
    let provider = object_bytes("helper(a, b) { return a + b; }\n");

    let mut linker = Linker::new();
    linker.load_module(&user).unwrap();
    linker.load_module(&provider).unwrap();
    linker.finish();
    assert_eq!(linker.log.error_count(), 0, "{:?}", linker.log.diagnostics());
    match lookup(&linker, "helper") {
        Some(SymKind::Func(f)) => {
            assert!(f.defined);
            assert!(!f.is_extern);
        }
        other => panic!("helper: {:?}", other),
    }
}

#[test]
fn unresolved_extern_is_a_link_error() {
    let user = object_bytes("extern object missingThing;\nuser: object;\n");
    let mut linker = Linker::new();
    linker.load_module(&user).unwrap();
    linker.finish();
    assert!(linker.log.error_count() > 0);
}

#[test]
fn duplicate_definitions_conflict() {
    let a = object_bytes("lamp: object;\n");
    let b = object_bytes("lamp: object;\n");
    let mut linker = Linker::new();
    linker.load_module(&a).unwrap();
    linker.load_module(&b).unwrap();
    assert!(linker.log.error_count() > 0);
}

#[test]
fn kind_conflict_is_reported_but_link_continues() {
    let a = object_bytes("thing: object;\n");
    let b = object_bytes("thing() { return 1; }\nother: object;\n");
    let mut linker = Linker::new();
    linker.load_module(&a).unwrap();
    linker.load_module(&b).unwrap();
    assert!(linker.log.error_count() > 0);
    // the rest of module b still arrived
    assert!(matches!(lookup(&linker, "other"), Some(SymKind::Object(_))));
}

#[test]
fn object_ids_are_reassigned_globally() {
    let a = object_bytes("alpha: object;\n");
    let b = object_bytes("beta: object;\n");
    let mut linker = Linker::new();
    linker.load_module(&a).unwrap();
    linker.load_module(&b).unwrap();
    let ida = match lookup(&linker, "alpha") {
        Some(SymKind::Object(o)) => o.obj_id,
        other => panic!("alpha: {:?}", other),
    };
    let idb = match lookup(&linker, "beta") {
        Some(SymKind::Object(o)) => o.obj_id,
        other => panic!("beta: {:?}", other),
    };
    assert_ne!(ida, idb);
}

#[test]
fn dictionary_words_merge_across_modules() {
    let a = object_bytes(
        "dictionary gDict;\ndictionary property vocabWords;\nclass Thing: object;\nThing template 'vocabWords';\nlamp: Thing 'brass lantern';\n",
    );
    let b = object_bytes(
        "dictionary gDict;\ndictionary property vocabWords;\nclass Thing2: object;\nThing2 template 'vocabWords';\nrug: Thing2 'persian rug';\n",
    );
    let mut linker = Linker::new();
    linker.load_module(&a).unwrap();
    linker.load_module(&b).unwrap();
    match lookup(&linker, "gDict") {
        Some(SymKind::Object(dict)) => {
            let words: Vec<&str> = dict
                .dict_words
                .keys()
                .map(|w| linker.interner.resolve(*w))
                .collect();
            assert!(words.contains(&"brass"), "{:?}", words);
            assert!(words.contains(&"rug"), "{:?}", words);
        }
        other => panic!("gDict: {:?}", other),
    }
}

#[test]
fn grammar_alternatives_merge() {
    let a = object_bytes(
        "dictionary property noun;\nclass Production: object;\ngrammar phrase(a): noun->n_ : Production;\n",
    );
    let b = object_bytes(
        "dictionary property noun;\nclass Production: object;\ngrammar phrase(b): noun->n_ noun->n2_ : Production;\n",
    );
    let mut linker = Linker::new();
    linker.load_module(&a).unwrap();
    linker.load_module(&b).unwrap();
    match lookup(&linker, "phrase") {
        Some(SymKind::Object(prod)) => {
            assert_eq!(prod.gram_alts.len(), 2);
        }
        other => panic!("phrase: {:?}", other),
    }
}

#[test]
fn symbol_file_marks_everything_external() {
    let bytes = symbol_bytes("lamp: object;\nscore(n) { return n; }\n");
    let mut linker = Linker::new();
    linker.load_module(&bytes).unwrap();
    match lookup(&linker, "lamp") {
        Some(SymKind::Object(o)) => assert!(o.is_extern),
        other => panic!("lamp: {:?}", other),
    }
    match lookup(&linker, "score") {
        Some(SymKind::Func(f)) => assert!(f.is_extern),
        other => panic!("score: {:?}", other),
    }
}

#[test]
fn corrupt_input_aborts_the_link() {
    let mut bytes = object_bytes("lamp: object;\n");
    bytes.truncate(bytes.len() / 2);
    let mut linker = Linker::new();
    assert!(matches!(
        linker.load_module(&bytes),
        Err(LinkError::Truncated) | Err(LinkError::BadRecord(_))
    ));
}

#[test]
fn round_trip_through_disk() {
    let bytes = object_bytes("treasure: object;\n");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("treasure.t3o");
    fs::write(&path, &bytes).unwrap();
    let read_back = fs::read(&path).unwrap();
    assert_eq!(bytes, read_back);
    let mut linker = Linker::new();
    linker.load_module(&read_back).unwrap();
    linker.finish();
    assert_eq!(linker.log.error_count(), 0);
    assert!(matches!(
        lookup(&linker, "treasure"),
        Some(SymKind::Object(_))
    ));
}

#[test]
fn multimethod_base_survives_extern_export() {
    let a = object_bytes("class Thing: object;\nact(Thing x) { return x; }\n");
    let mut linker = Linker::new();
    linker.load_module(&a).unwrap();
    linker.finish();
    // the undecorated base symbol is a shared placeholder, not an
    // unresolved extern
    match lookup(&linker, "act") {
        Some(SymKind::Func(f)) => assert!(f.is_mm_base),
        other => panic!("act: {:?}", other),
    }
    assert_eq!(linker.log.error_count(), 0, "{:?}", linker.log.diagnostics());
}
