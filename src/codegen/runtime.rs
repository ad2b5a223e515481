//! The runtime surface every generated program shares: `@program`'s
//! `indirectbr` prologue, `@main`, external symbol declarations, and the
//! attribute groups / module metadata common to every `.ll` file (grounded
//! in `semantic/functions.py`'s `Main`/`Program`/`LLVM_TAIL`).

use super::state::{Function, Instruction, SemanticState};

pub fn new_program_function() -> Function {
    let mut f = Function::new("program", "void", "i8* %target_label", "#0");
    f.append(Instruction::deferred(|state: &SemanticState| {
        let mut targets: Vec<i64> = state.gosub_targets.iter().copied().collect();
        if let Some(entry) = state.entry_point {
            if !targets.contains(&entry) {
                targets.push(entry);
            }
        }
        if targets.is_empty() {
            return None;
        }
        targets.sort_unstable();
        let labels = targets
            .iter()
            .map(|t| format!("label %label_{}", t))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("indirectbr i8* %target_label, [ {} ]", labels))
    }));
    f
}

pub fn new_main_function() -> Function {
    let mut f = Function::new("main", "i32", "", "#1");
    f.append(Instruction::deferred(|state: &SemanticState| {
        state
            .entry_point
            .map(|entry| format!("tail call void @program(i8* blockaddress(@program, %label_{})) #0", entry))
    }));
    f.append(Instruction::Literal("ret i32 0".to_string()));
    f
}

/// Maps an external symbol name used anywhere in the generated program to
/// its `declare` line. Symbols are inserted into `external_symbols` by the
/// code that uses them and declared here, sorted, once the program is complete.
pub fn declaration_for(symbol: &str) -> &'static str {
    match symbol {
        "exit" => "declare void @exit(i32) local_unnamed_addr noreturn #0",
        "printf" => "declare i32 @printf(i8* nocapture readonly, ...) local_unnamed_addr #0",
        "putchar" => "declare i32 @putchar(i32) local_unnamed_addr #0",
        "llvm.sin.f64" => "declare double @llvm.sin.f64(double) local_unnamed_addr #0",
        "llvm.cos.f64" => "declare double @llvm.cos.f64(double) local_unnamed_addr #0",
        "tan" => "declare double @tan(double) local_unnamed_addr #0",
        "atan" => "declare double @atan(double) local_unnamed_addr #0",
        "llvm.exp.f64" => "declare double @llvm.exp.f64(double) local_unnamed_addr #0",
        "llvm.fabs.f64" => "declare double @llvm.fabs.f64(double) local_unnamed_addr #0",
        "llvm.log.f64" => "declare double @llvm.log.f64(double) local_unnamed_addr #0",
        "llvm.sqrt.f64" => "declare double @llvm.sqrt.f64(double) local_unnamed_addr #0",
        "llvm.rint.f64" => "declare double @llvm.rint.f64(double) local_unnamed_addr #0",
        "rand" => "declare i32 @rand() local_unnamed_addr #0",
        "llvm.pow.f64" => "declare double @llvm.pow.f64(double, double) local_unnamed_addr #0",
        other => panic!("no declaration known for external symbol '{}'", other),
    }
}

pub const ATTRIBUTE_GROUPS: &str = r#"attributes #0 = { nounwind "correctly-rounded-divide-sqrt-fp-math"="false" "disable-tail-calls"="false" "less-precise-fpmad"="false" "no-frame-pointer-elim"="false" "no-infs-fp-math"="true" "no-jump-tables"="false" "no-nans-fp-math"="true" "no-signed-zeros-fp-math"="true" "no-trapping-math"="true" "stack-protector-buffer-size"="8" "target-cpu"="x86-64" "target-features"="+fxsr,+mmx,+sse,+sse2,+x87" "unsafe-fp-math"="true" "use-soft-float"="false" }
attributes #1 = { norecurse nounwind "correctly-rounded-divide-sqrt-fp-math"="false" "disable-tail-calls"="false" "less-precise-fpmad"="false" "no-frame-pointer-elim"="false" "no-infs-fp-math"="true" "no-jump-tables"="false" "no-nans-fp-math"="true" "no-signed-zeros-fp-math"="true" "no-trapping-math"="true" "stack-protector-buffer-size"="8" "target-cpu"="x86-64" "target-features"="+fxsr,+mmx,+sse,+sse2,+x87" "unsafe-fp-math"="true" "use-soft-float"="false" }"#;

pub const MODULE_IDENT: &str = r#"!llvm.ident = !{!0}
!0 = !{!"basicc BASIC-to-LLVM-IR compiler"}"#;
