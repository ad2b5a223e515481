//! End-to-end scenarios from spec.md §8, asserting on the generated `.ll`
//! text rather than `lli`-executed stdout — this sandbox has no LLVM
//! toolchain to invoke, so textual assertions on the IR's control-flow
//! shape, `printf` format strings, and `DATA` array contents stand in for
//! the interpreter-observed output the spec describes.

use std::io::Write;

use basicc::compile_source;

fn compile(source: &str) -> String {
    let mut file = tempfile::Builder::new().suffix(".bas").tempfile().unwrap();
    write!(file, "{}", source).unwrap();
    compile_source(file.path()).unwrap_or_else(|e| panic!("compilation failed:\n{}", e))
}

fn compile_err(source: &str) -> String {
    let mut file = tempfile::Builder::new().suffix(".bas").tempfile().unwrap();
    write!(file, "{}", source).unwrap();
    compile_source(file.path())
        .expect_err("expected compilation to fail")
        .to_string()
}

#[test]
fn bare_end_emits_exit_and_no_printf() {
    let ir = compile("10 END\n");
    assert!(ir.contains("tail call void @exit(i32 0) noreturn #0"));
    assert!(ir.contains("unreachable"));
    assert!(!ir.contains("@printf"));
    assert!(ir.contains("label_10:"));
}

#[test]
fn print_statements_build_printf_calls_with_expected_format_strings() {
    let ir = compile(
        "10 PRINT\n20 PRINT \"test\"\n30 PRINT \"test without a new line\",\n40 END\n",
    );
    // Bare PRINT: a single newline via putchar, not printf.
    assert!(ir.contains("call i32 @putchar(i32 10)"));
    // A string item with a trailing end-of-line prints "%s\0A".
    assert!(ir.contains("c\"%s\\0A\\00\""));
    assert!(ir.contains("c\"test\\00\""));
    // A string item ending on a trailing comma has no newline suffix.
    assert!(ir.contains("c\"%s\\00\""));
    assert!(ir.contains("c\"test without a new line\\00\""));
    assert!(ir.contains("declare i32 @printf"));
    assert!(ir.contains("declare i32 @putchar"));
}

#[test]
fn doubled_quote_escaping_in_print_decodes_to_a_single_quote_byte() {
    // Regression: the quote-pair substitution ran before the backslash
    // substitution, so the `\` it had just inserted (as part of `\22`) was
    // immediately re-escaped into `\5C22`, corrupting the constant.
    let ir = compile("10 PRINT \"a\"\"b\"\n20 END\n");
    assert!(ir.contains("c\"a\\22b\\00\""), "expected a single \\22 escape, got:\n{}", ir);
    assert!(!ir.contains("\\5C22"), "backslash from the quote escape must not be re-escaped, got:\n{}", ir);
    assert!(ir.contains("[4 x i8]"));
}

#[test]
fn let_with_arithmetic_precedence_then_print_emits_fmul_before_fadd() {
    let ir = compile("10 LET X = 1+2*3\n20 PRINT X\n30 END\n");
    let mul_pos = ir.find("fmul fast double").expect("expected an fmul instruction");
    let add_pos = ir.find("fadd fast double").expect("expected an fadd instruction");
    assert!(mul_pos < add_pos, "multiplication must be reduced before addition");
    assert!(ir.contains("store double"));
    assert!(ir.contains("%f"));
}

#[test]
fn for_loop_emits_header_label_and_step_comparison() {
    let ir = compile("10 FOR I=0 TO 10\n20 PRINT I\n30 NEXT I\n40 END\n");
    assert!(ir.contains("label_10:"));
    assert!(ir.contains("fcmp ole double"));
    assert!(ir.contains("fadd fast double"));
    // NEXT branches back to the loop header and falls through on exit.
    assert!(ir.contains("br i1"));
}

#[test]
fn goto_and_gosub_route_through_the_program_indirectbr_prologue() {
    let ir = compile("10 GOSUB 100\n20 END\n100 PRINT \"hi\"\n110 RETURN\n");
    assert!(ir.contains("indirectbr i8* %target_label"));
    assert!(ir.contains("blockaddress(@program, %label_100)"));
    assert!(ir.contains("ret void"));
}

#[test]
fn go_to_two_words_is_accepted_as_a_goto_synonym() {
    let ir = compile("10 GO TO 20\n20 END\n");
    assert!(ir.contains("br label %label_20"));
}

#[test]
fn a_remark_between_a_goto_and_its_referenced_label_does_not_duplicate_the_terminator() {
    // Regression: `label()`'s `needs_branch` check used to look only at the
    // raw last instruction, so an intervening `;skip` comment (from the
    // unreferenced label 20's REM) hid the real terminator `goto()` had
    // already emitted and queued a second, redundant `br label %label_30`
    // right after it — two terminators in a row with no block boundary.
    let ir = compile("10 GOTO 30\n20 REM skip\n30 PRINT 1\n40 END\n");
    let branch = "br label %label_30";
    let first = ir.find(branch).expect("expected a branch to label_30");
    assert!(
        ir[first + branch.len()..].find(branch).is_none(),
        "label_30 should only be branched to once, got:\n{}",
        ir
    );
    let comment_pos = ir.find(";skip").expect("expected the REM comment to survive");
    let label_pos = ir.find("label_30:").expect("expected label_30's header");
    assert!(first < comment_pos && comment_pos < label_pos);
}

#[test]
fn read_data_increments_data_index_once_per_read_item() {
    let ir = compile("10 READ X\n20 READ Y\n30 DATA 1, 2\n40 END\n");
    let inc_count = ir.matches("store i32 %i_").count();
    assert_eq!(inc_count, 2, "exactly one data_index increment per READ item");
    assert!(ir.contains("[2 x double]"));
    assert!(ir.contains("double 1."));
    assert!(ir.contains("double 2."));
}

#[test]
fn signed_data_items_apply_their_sign() {
    let ir = compile("10 READ X\n20 DATA -5\n30 END\n");
    assert!(ir.contains("double -5."));
}

#[test]
fn dim_declares_a_multidimensional_array_and_indexes_it() {
    let ir = compile("10 DIM A(3,4)\n20 LET A(1,2) = 5\n30 END\n");
    assert!(ir.contains("[3 x [4 x double]] zeroinitializer"));
    assert!(ir.contains("getelementptr inbounds [3 x [4 x double]]"));
}

#[test]
fn if_then_emits_a_float_compare_and_conditional_branch() {
    let ir = compile("10 IF 1 = 2 THEN 30\n20 PRINT \"no\"\n30 END\n");
    assert!(ir.contains("fcmp oeq double"));
    assert!(ir.contains("br i1"));
    assert!(ir.contains("label_30"));
}

#[test]
fn def_fn_generates_a_one_argument_function() {
    let ir = compile("10 DEF FNSQ(X) = X*X\n20 PRINT FNSQ(3)\n30 END\n");
    assert!(ir.contains("define dso_local double @FNSQ(double %arg)"));
    assert!(ir.contains("ret double"));
    assert!(ir.contains("tail call fast double @FNSQ(double"));
}

#[test]
fn builtin_math_functions_dispatch_to_their_llvm_intrinsics() {
    let ir = compile("10 PRINT SQR(9)\n20 PRINT SIN(0)\n30 END\n");
    assert!(ir.contains("declare double @llvm.sqrt.f64"));
    assert!(ir.contains("declare double @llvm.sin.f64"));
}

#[test]
fn rnd_lowers_to_rand_and_a_fixed_divisor() {
    let ir = compile("10 PRINT RND(0)\n20 END\n");
    assert!(ir.contains("call i32 @rand()"));
    assert!(ir.contains("2147483647."));
}

#[test]
fn up_arrow_exponentiation_lowers_to_llvm_pow() {
    let ir = compile("10 PRINT 2\u{2191}3\n20 END\n");
    assert!(ir.contains("declare double @llvm.pow.f64"));
    assert!(ir.contains("tail call fast double @llvm.pow.f64"));
}

#[test]
fn remark_and_rem_both_emit_a_comment_line() {
    let ir = compile("10 REMARK this is fine\n20 REM so is this\n30 END\n");
    assert!(ir.contains(";this is fine"));
    assert!(ir.contains(";so is this"));
}

#[test]
fn undefined_goto_target_is_a_semantic_error() {
    let err = compile_err("10 GOTO 999\n20 END\n");
    assert!(err.contains("999"));
}

#[test]
fn duplicate_label_is_a_semantic_error() {
    let err = compile_err("10 PRINT \"a\"\n10 PRINT \"b\"\n");
    assert!(err.contains("10"));
}

#[test]
fn next_without_a_matching_for_is_a_semantic_error() {
    let err = compile_err("10 NEXT I\n20 END\n");
    assert!(err.to_lowercase().contains("for"));
}

#[test]
fn read_without_data_is_a_semantic_error() {
    let err = compile_err("10 READ X\n20 END\n");
    assert!(err.to_lowercase().contains("data"));
}

#[test]
fn unknown_function_identifier_is_a_semantic_error() {
    let err = compile_err("10 PRINT BOGUS(1)\n20 END\n");
    assert!(err.contains("BOGUS"));
}

#[test]
fn compiling_the_same_source_twice_is_byte_identical() {
    let source = "10 FOR I=1 TO 5\n20 PRINT I\n30 NEXT I\n40 END\n";
    assert_eq!(compile(source), compile(source));
}

#[test]
fn missing_source_file_is_an_io_error() {
    let err = compile_source("/no/such/path.bas").unwrap_err();
    assert!(err.to_string().len() > 0);
}
