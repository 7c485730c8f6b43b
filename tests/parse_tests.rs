//! Whole-compile parsing scenarios: object definitions, templates,
//! grammar rules, closures, and diagnostics.

use tadsc::compile::{compile_source, CompilerOptions};

fn compile(source: &str) -> tadsc::compile::CompileOutput {
    compile_source("test.t", source, CompilerOptions::default(), true)
}

fn compile_syntax_only(source: &str) -> tadsc::compile::CompileOutput {
    let options = CompilerOptions {
        syntax_only: true,
        ..CompilerOptions::default()
    };
    compile_source("test.t", source, options, true)
}

#[test]
fn room_with_properties_and_method() {
    let source = r#"
bigCave: object
    name = 'Big Cave'
    visits = 0
    lookAround(verbose) {
        local n = self.visits + 1;
        self.visits = n;
        return n;
    }
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
    let dump = out.symbol_dump.unwrap();
    assert!(dump.contains("bigCave"), "{}", dump);
}

#[test]
fn undeclared_member_is_assumed_property() {
    // foo.bar with bar undeclared warns and defines a
    // property
    let source = "f(foo) { return foo.bar; }\n";
    let out = compile(source);
    assert_eq!(out.exit_code, 0);
    assert!(
        out.diagnostics.contains("assumed to be a property"),
        "{}",
        out.diagnostics
    );
    let dump = out.symbol_dump.unwrap();
    assert!(dump.contains("\"bar\""), "{}", dump);
}

#[test]
fn class_template_drives_object_header() {
    let source = r#"
class Room: object
;
Room template 'roomName' "roomDesc"?;
startCave: Room 'Start Cave' "You are at the start."
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn unmatched_template_args_are_an_error() {
    let source = r#"
class Room: object
;
startCave: Room 42
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 1);
    assert!(
        out.diagnostics.contains("does not match any template"),
        "{}",
        out.diagnostics
    );
}

#[test]
fn plus_location_stack() {
    let source = r#"
cave: object
;
+ lamp: object
;
++ wick: object
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn grammar_and_dictionary() {
    let source = r#"
dictionary gDict;
dictionary property noun, adjective;
class Production: object
;
grammar nounPhrase(main): adjective->adj_ noun->noun_ | noun->noun_ : Production
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
    let dump = out.symbol_dump.unwrap();
    assert!(dump.contains("nounPhrase"), "{}", dump);
    assert!(dump.contains("gDict"), "{}", dump);
}

#[test]
fn enum_and_export() {
    let source = r#"
enum token tokInt, tokWord;
enum red, green, blue;
export red 'colorRed';
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
    let dump = out.symbol_dump.unwrap();
    assert!(dump.contains("tokInt"));
    assert!(dump.contains("blue"));
}

#[test]
fn anonymous_function_captures_local() {
    let source = r#"
makeCounter() {
    local count = 0;
    return function(step) { count = count + step; return count; };
}
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn multimethod_definition_exports_base() {
    let source = r#"
class Thing: object
;
class Container: object
;
putIn(Thing obj, Container cont) { return obj; }
putIn(Thing obj, cont) { return cont; }
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
    let dump = out.symbol_dump.unwrap();
    // both decorated variants plus the shared base symbol
    assert!(dump.contains("putIn*Thing;Container;"), "{}", dump);
    assert!(dump.contains("putIn*Thing;;"), "{}", dump);
}

#[test]
fn dstring_embeddings_parse() {
    let source = r#"
pedestal: object
    describe() {
        "The pedestal holds <<self.gemCount>> gems<<if self.gemCount == 1>> only<<end>>. ";
    }
    gemCount = 3
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn modify_and_replace() {
    let source = r#"
lamp: object
    brightness = 1
;
modify lamp
    brightness = 2
;
f() { return 1; }
replace f() { return 2; }
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn unreferenced_local_warns() {
    let source = "f() { local unused; return 1; }\n";
    let out = compile_syntax_only(source);
    assert_eq!(out.exit_code, 0);
    assert!(
        out.diagnostics.contains("never used"),
        "{}",
        out.diagnostics
    );
}

#[test]
fn statement_forms_parse() {
    let source = r#"
control(x) {
    local total = 0;
    for (local i = 1; i <= x; i++)
        total += i;
    foreach (local v in [1, 2, 3])
        total += v;
    while (total > 100) {
        total -= 10;
    }
    do {
        total++;
    } while (total < 0);
    switch (total) {
    case 0:
        total = 1;
        break;
    default:
        break;
    }
    try {
        throw total;
    }
    catch (RuntimeError e) {
        total = 0;
    }
    finally {
        total += 1;
    }
again:
    if (total < 0)
        goto again;
    return total;
}
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn recovery_reports_multiple_errors() {
    let source = r#"
f() { return 1 }
g() { local x = ; return 1; }
h() { return 2; }
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 1);
    // the parser resynchronized and still saw h()
    let dump = out.symbol_dump.unwrap();
    assert!(dump.contains("\"h\""), "{}", dump);
}

#[test]
fn propertyset_expands_names() {
    let source = r#"
thing: object
    propertyset 'dobjFor*' {
        Take() { return 1; }
        Drop() { return 2; }
    }
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}

#[test]
fn vocab_words_reach_the_dictionary() {
    let source = r#"
dictionary gDict;
dictionary property vocabWords;
class Thing: object
;
Thing template 'vocabWords';
lamp: Thing 'brass lantern'
;
"#;
    let out = compile(source);
    assert_eq!(out.exit_code, 0, "{}", out.diagnostics);
}
