//! Runtime subroutines appended after `main`.
//!
//! Calling convention: arguments in `a0`..`a2`, result in `a0`. Float values
//! travel as their bit pattern in integer registers. Builtins may clobber
//! `t0`..`t5`, `a0`..`a2`, `a7` and the float temporaries unless noted; the
//! guards `checkDivZero` and `checkBounds` touch only `a0`, `a1` and `a7`.
//! Anything that writes bytes to the heap leaves `t6` word-aligned.

use tracing::debug;

use super::asm::{Assembler, FRegister, Instruction, Label, Opcode, Register};
use super::error::CodegenErrorKind;

use FRegister::*;
use Register::*;

pub struct BuiltinEntry {
    pub name: &'static str,
    /// Other builtins this one calls.
    pub requires: &'static [&'static str],
    pub emit: fn(&mut Assembler),
}

pub const BUILTINS: &[BuiltinEntry] = &[
    BuiltinEntry {
        name: "concatString",
        requires: &[],
        emit: concat_string,
    },
    BuiltinEntry {
        name: "strEquals",
        requires: &[],
        emit: str_equals,
    },
    BuiltinEntry {
        name: "toUpperCase",
        requires: &[],
        emit: to_upper_case,
    },
    BuiltinEntry {
        name: "toLowerCase",
        requires: &[],
        emit: to_lower_case,
    },
    BuiltinEntry {
        name: "intToString",
        requires: &[],
        emit: int_to_string,
    },
    BuiltinEntry {
        name: "floatToString",
        requires: &[],
        emit: float_to_string,
    },
    BuiltinEntry {
        name: "boolToString",
        requires: &[],
        emit: bool_to_string,
    },
    BuiltinEntry {
        name: "charToString",
        requires: &[],
        emit: char_to_string,
    },
    BuiltinEntry {
        name: "parseInt",
        requires: &[],
        emit: parse_int,
    },
    BuiltinEntry {
        name: "parseFloat",
        requires: &[],
        emit: parse_float,
    },
    BuiltinEntry {
        name: "checkDivZero",
        requires: &[],
        emit: check_div_zero,
    },
    BuiltinEntry {
        name: "checkBounds",
        requires: &[],
        emit: check_bounds,
    },
    BuiltinEntry {
        name: "printArray",
        requires: &[],
        emit: print_array,
    },
    BuiltinEntry {
        name: "arrayIndexOf",
        requires: &["strEquals"],
        emit: array_index_of,
    },
    BuiltinEntry {
        name: "arrayJoin",
        requires: &[
            "concatString",
            "intToString",
            "floatToString",
            "boolToString",
            "charToString",
        ],
        emit: array_join,
    },
];

pub fn lookup(name: &str) -> Option<&'static BuiltinEntry> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Builtins referenced so far, in first-use order.
#[derive(Debug, Default)]
pub struct BuiltinSet {
    used: Vec<&'static str>,
}

impl BuiltinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` (and everything it calls) as used.
    pub fn request(&mut self, name: &str) -> Result<&'static str, CodegenErrorKind> {
        let entry = lookup(name).ok_or_else(|| CodegenErrorKind::UnknownBuiltin(name.to_string()))?;
        if !self.used.contains(&entry.name) {
            debug!(builtin = entry.name, "first use");
            self.used.push(entry.name);
            for dep in entry.requires {
                self.request(dep)?;
            }
        }
        Ok(entry.name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.iter().any(|n| *n == name)
    }

    pub fn used(&self) -> &[&'static str] {
        &self.used
    }

    /// Emit every used builtin once, each under its own label and ending in `ret`.
    pub fn materialize(&self, comments: bool) -> Result<Vec<Instruction>, CodegenErrorKind> {
        let mut asm = Assembler::new(comments);
        for name in &self.used {
            let entry = lookup(name).ok_or_else(|| CodegenErrorKind::UnknownBuiltin(name.to_string()))?;
            asm.label(&Label::new(entry.name));
            (entry.emit)(&mut asm);
            asm.ret();
        }
        Ok(asm.into_instructions())
    }
}

fn l(name: &str) -> Label {
    Label::new(name)
}

/// Round the heap pointer up to the next word boundary.
fn align_heap(asm: &mut Assembler) {
    asm.addi(Register::HP, Register::HP, 3);
    asm.andi(Register::HP, Register::HP, -4);
}

/// Terminate the heap string started at `start` and return it in `a0`.
fn finish_string(asm: &mut Assembler, start: Register) {
    asm.sb(Zero, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
    asm.mv(A0, start);
    align_heap(asm);
}

/// Print a message and exit with status 1.
fn fail_with(asm: &mut Assembler, message: &str) {
    asm.la(A0, message);
    asm.syscall(4);
    asm.li(A0, 1);
    asm.syscall(93);
}

/// Append the string at `src` to the heap, advancing `src`.
fn copy_bytes(asm: &mut Assembler, src: Register, loop_label: &str, end_label: &str) {
    let (top, end) = (l(loop_label), l(end_label));
    asm.label(&top);
    asm.lb(T1, 0, src);
    asm.beqz(T1, &end);
    asm.sb(T1, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
    asm.addi(src, src, 1);
    asm.j(&top);
    asm.label(&end);
}

fn concat_string(asm: &mut Assembler) {
    asm.comment("a0 = a0 ++ a1, copied to the heap");
    asm.mv(T0, Register::HP);
    copy_bytes(asm, A0, "concatString_first", "concatString_second");
    copy_bytes(asm, A1, "concatString_copy", "concatString_done");
    finish_string(asm, T0);
}

fn str_equals(asm: &mut Assembler) {
    asm.comment("a0 = 1 if the strings at a0 and a1 are equal");
    let (top, eq, ne) = (l("strEquals_loop"), l("strEquals_eq"), l("strEquals_ne"));
    asm.label(&top);
    asm.lb(T0, 0, A0);
    asm.lb(T1, 0, A1);
    asm.bne(T0, T1, &ne);
    asm.beqz(T0, &eq);
    asm.addi(A0, A0, 1);
    asm.addi(A1, A1, 1);
    asm.j(&top);
    asm.label(&eq);
    asm.li(A0, 1);
    asm.ret();
    asm.label(&ne);
    asm.li(A0, 0);
}

/// Copy the string at `a0`, shifting bytes in `lo..=hi` by `delta`.
fn map_case(asm: &mut Assembler, prefix: &str, lo: u8, hi: u8, delta: i64) {
    let top = l(&format!("{}_loop", prefix));
    let store = l(&format!("{}_store", prefix));
    let done = l(&format!("{}_done", prefix));
    asm.mv(T0, Register::HP);
    asm.label(&top);
    asm.lb(T1, 0, A0);
    asm.beqz(T1, &done);
    asm.li(T2, lo as i64);
    asm.blt(T1, T2, &store);
    asm.li(T2, hi as i64);
    asm.bgt(T1, T2, &store);
    asm.addi(T1, T1, delta);
    asm.label(&store);
    asm.sb(T1, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
    asm.addi(A0, A0, 1);
    asm.j(&top);
    asm.label(&done);
    finish_string(asm, T0);
}

fn to_upper_case(asm: &mut Assembler) {
    map_case(asm, "toUpperCase", b'a', b'z', -32);
}

fn to_lower_case(asm: &mut Assembler) {
    map_case(asm, "toLowerCase", b'A', b'Z', 32);
}

/// Write the decimal digits of the non-negative `value` at the heap pointer.
/// Clobbers `t1`..`t4`.
fn emit_digits(asm: &mut Assembler, prefix: &str, value: Register) {
    let digits = l(&format!("{}_digits", prefix));
    let reverse = l(&format!("{}_reverse", prefix));
    let done = l(&format!("{}_reversed", prefix));
    asm.mv(T2, Register::HP);
    asm.li(T3, 10);
    asm.comment("unsigned, so a negated INT_MIN still reads as 2147483648");
    asm.label(&digits);
    asm.remu(T1, value, T3);
    asm.divu(value, value, T3);
    asm.addi(T1, T1, 48);
    asm.sb(T1, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
    asm.bnez(value, &digits);

    asm.comment("digits were written least significant first");
    asm.addi(T3, Register::HP, -1);
    asm.label(&reverse);
    asm.bge(T2, T3, &done);
    asm.lb(T1, 0, T2);
    asm.lb(T4, 0, T3);
    asm.sb(T4, 0, T2);
    asm.sb(T1, 0, T3);
    asm.addi(T2, T2, 1);
    asm.addi(T3, T3, -1);
    asm.j(&reverse);
    asm.label(&done);
}

fn write_minus(asm: &mut Assembler) {
    asm.li(T1, b'-' as i64);
    asm.sb(T1, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
}

fn int_to_string(asm: &mut Assembler) {
    let positive = l("intToString_positive");
    asm.mv(T0, Register::HP);
    asm.bgez(A0, &positive);
    write_minus(asm);
    asm.neg(A0, A0);
    asm.label(&positive);
    emit_digits(asm, "intToString", A0);
    finish_string(asm, T0);
}

/// Integer part, then up to six fraction digits with trailing zeros dropped.
fn float_to_string(asm: &mut Assembler) {
    let positive = l("floatToString_positive");
    let next = l("floatToString_next");
    let trim = l("floatToString_trim");
    asm.fmv_w_x(Ft0, A0);
    asm.mv(T0, Register::HP);
    asm.bgez(A0, &positive);
    write_minus(asm);
    asm.fabs(Ft0, Ft0);
    asm.label(&positive);
    asm.fcvt_w_s(T5, Ft0);
    asm.fcvt_s_w(Ft1, T5);
    asm.fop(Opcode::FsubS, Ft0, Ft0, Ft1);
    emit_digits(asm, "floatToString", T5);

    asm.comment("t5 marks the end of the last significant digit");
    asm.mv(T5, Register::HP);
    asm.li(T1, b'.' as i64);
    asm.sb(T1, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
    asm.li(T2, 6);
    asm.li(T3, 10);
    asm.fcvt_s_w(Ft2, T3);
    asm.label(&next);
    asm.beqz(T2, &trim);
    asm.fop(Opcode::FmulS, Ft0, Ft0, Ft2);
    asm.fcvt_w_s(T1, Ft0);
    asm.fcvt_s_w(Ft1, T1);
    asm.fop(Opcode::FsubS, Ft0, Ft0, Ft1);
    asm.addi(T1, T1, 48);
    asm.sb(T1, 0, Register::HP);
    asm.addi(Register::HP, Register::HP, 1);
    asm.addi(T2, T2, -1);
    asm.li(T4, 48);
    asm.beq(T1, T4, &next);
    asm.mv(T5, Register::HP);
    asm.j(&next);
    asm.label(&trim);
    asm.mv(Register::HP, T5);
    finish_string(asm, T0);
}

fn bool_to_string(asm: &mut Assembler) {
    let done = l("boolToString_done");
    asm.la(T0, "str_true");
    asm.bnez(A0, &done);
    asm.la(T0, "str_false");
    asm.label(&done);
    asm.mv(A0, T0);
}

fn char_to_string(asm: &mut Assembler) {
    asm.mv(T0, Register::HP);
    asm.sb(A0, 0, Register::HP);
    asm.sb(Zero, 1, Register::HP);
    asm.addi(Register::HP, Register::HP, 4);
    asm.mv(A0, T0);
}

/// Optional `-` then digits, leaving the cursor in `a0` at the first
/// non-digit. Accumulates into `t0`; `t1` is the sign flag.
fn parse_digits(asm: &mut Assembler, prefix: &str) {
    let digits = l(&format!("{}_digits", prefix));
    let done = l(&format!("{}_int_done", prefix));
    asm.li(T0, 0);
    asm.li(T1, 0);
    asm.lb(T2, 0, A0);
    asm.li(T3, b'-' as i64);
    asm.bne(T2, T3, &digits);
    asm.li(T1, 1);
    asm.addi(A0, A0, 1);
    asm.label(&digits);
    asm.lb(T2, 0, A0);
    asm.li(T3, b'0' as i64);
    asm.blt(T2, T3, &done);
    asm.li(T3, b'9' as i64);
    asm.bgt(T2, T3, &done);
    asm.addi(T2, T2, -48);
    asm.li(T3, 10);
    asm.mul(T0, T0, T3);
    asm.add(T0, T0, T2);
    asm.addi(A0, A0, 1);
    asm.j(&digits);
    asm.label(&done);
}

/// Reads a leading integer; a fractional part is ignored.
fn parse_int(asm: &mut Assembler) {
    let done = l("parseInt_done");
    parse_digits(asm, "parseInt");
    asm.beqz(T1, &done);
    asm.neg(T0, T0);
    asm.label(&done);
    asm.mv(A0, T0);
}

fn parse_float(asm: &mut Assembler) {
    let fraction = l("parseFloat_fraction");
    let sign = l("parseFloat_sign");
    let done = l("parseFloat_done");
    parse_digits(asm, "parseFloat");
    asm.fcvt_s_w(Ft0, T0);
    asm.lb(T2, 0, A0);
    asm.li(T3, b'.' as i64);
    asm.bne(T2, T3, &sign);
    asm.addi(A0, A0, 1);
    asm.li(T3, 10);
    asm.fcvt_s_w(Ft2, T3);
    asm.li(T3, 1);
    asm.fcvt_s_w(Ft1, T3);
    asm.comment("ft1 is the place value of the next digit");
    asm.label(&fraction);
    asm.lb(T2, 0, A0);
    asm.li(T3, b'0' as i64);
    asm.blt(T2, T3, &sign);
    asm.li(T3, b'9' as i64);
    asm.bgt(T2, T3, &sign);
    asm.addi(T2, T2, -48);
    asm.fop(Opcode::FdivS, Ft1, Ft1, Ft2);
    asm.fcvt_s_w(Ft3, T2);
    asm.fop(Opcode::FmulS, Ft3, Ft3, Ft1);
    asm.fop(Opcode::FaddS, Ft0, Ft0, Ft3);
    asm.addi(A0, A0, 1);
    asm.j(&fraction);
    asm.label(&sign);
    asm.beqz(T1, &done);
    asm.fneg(Ft0, Ft0);
    asm.label(&done);
    asm.fmv_x_w(A0, Ft0);
}

fn check_div_zero(asm: &mut Assembler) {
    let fail = l("checkDivZero_fail");
    asm.comment("a0 = divisor");
    asm.beqz(A0, &fail);
    asm.ret();
    asm.label(&fail);
    fail_with(asm, "err_div_zero");
}

fn check_bounds(asm: &mut Assembler) {
    let fail = l("checkBounds_fail");
    asm.comment("a0 = index, a1 = length");
    asm.bltz(A0, &fail);
    asm.bge(A0, A1, &fail);
    asm.ret();
    asm.label(&fail);
    fail_with(asm, "err_bounds");
}

fn print_char(asm: &mut Assembler, c: u8) {
    asm.li(A0, c as i64);
    asm.syscall(11);
}

/// `a0` = element 0, `a1` = element kind code. Prints `[a, b, c]`.
fn print_array(asm: &mut Assembler) {
    let top = l("printArray_loop");
    let elem = l("printArray_elem");
    let int = l("printArray_int");
    let float = l("printArray_float");
    let boolean = l("printArray_bool");
    let truthy = l("printArray_true");
    let text = l("printArray_text");
    let chr = l("printArray_char");
    let next = l("printArray_next");
    let done = l("printArray_done");

    asm.mv(T0, A0);
    asm.mv(T1, A1);
    asm.lw(T2, -4, T0);
    asm.li(T3, 0);
    print_char(asm, b'[');
    asm.label(&top);
    asm.bge(T3, T2, &done);
    asm.beqz(T3, &elem);
    print_char(asm, b',');
    print_char(asm, b' ');
    asm.label(&elem);
    asm.slli(T4, T3, 2);
    asm.add(T4, T0, T4);
    asm.lw(A0, 0, T4);
    for (code, target) in [(1, &int), (2, &float), (3, &boolean), (4, &chr)] {
        asm.li(T5, code);
        asm.beq(T1, T5, target);
    }
    asm.j(&text);
    asm.label(&int);
    asm.syscall(1);
    asm.j(&next);
    asm.label(&float);
    asm.fmv_w_x(Fa0, A0);
    asm.syscall(2);
    asm.j(&next);
    asm.label(&boolean);
    asm.bnez(A0, &truthy);
    asm.la(A0, "str_false");
    asm.j(&text);
    asm.label(&truthy);
    asm.la(A0, "str_true");
    asm.label(&text);
    asm.syscall(4);
    asm.j(&next);
    asm.label(&chr);
    asm.syscall(11);
    asm.label(&next);
    asm.addi(T3, T3, 1);
    asm.j(&top);
    asm.label(&done);
    print_char(asm, b']');
}

/// `a0` = element 0, `a1` = value, `a2` = element kind code; `a0` = index or -1.
fn array_index_of(asm: &mut Assembler) {
    let top = l("arrayIndexOf_loop");
    let word = l("arrayIndexOf_word");
    let next = l("arrayIndexOf_next");
    let found = l("arrayIndexOf_found");
    let missing = l("arrayIndexOf_missing");
    let exit = l("arrayIndexOf_exit");

    asm.addi(Sp, Sp, -4);
    asm.sw(Ra, 0, Sp);
    asm.mv(T2, A0);
    asm.mv(T5, A1);
    asm.lw(T3, -4, T2);
    asm.li(T4, 0);
    asm.label(&top);
    asm.bge(T4, T3, &missing);
    asm.slli(T0, T4, 2);
    asm.add(T0, T2, T0);
    asm.lw(A0, 0, T0);
    asm.li(T1, 5);
    asm.bne(A2, T1, &word);
    asm.mv(A1, T5);
    asm.jal("strEquals");
    asm.bnez(A0, &found);
    asm.j(&next);
    asm.label(&word);
    asm.beq(A0, T5, &found);
    asm.label(&next);
    asm.addi(T4, T4, 1);
    asm.j(&top);
    asm.label(&found);
    asm.mv(A0, T4);
    asm.j(&exit);
    asm.label(&missing);
    asm.li(A0, -1);
    asm.label(&exit);
    asm.lw(Ra, 0, Sp);
    asm.addi(Sp, Sp, 4);
}

/// `a0` = element 0, `a1` = element kind code; `a0` = elements joined by ",".
fn array_join(asm: &mut Assembler) {
    let top = l("arrayJoin_loop");
    let elem = l("arrayJoin_elem");
    let append = l("arrayJoin_append");
    let done = l("arrayJoin_done");
    let saved = [Ra, S2, S3, S4, S5];

    asm.addi(Sp, Sp, -(saved.len() as i64) * 4);
    for (i, reg) in saved.iter().enumerate() {
        asm.sw(*reg, i as i64 * 4, Sp);
    }
    asm.mv(S2, A0);
    asm.mv(S3, A1);
    asm.li(S4, 0);
    asm.la(S5, "str_empty");

    asm.label(&top);
    asm.lw(T0, -4, S2);
    asm.bge(S4, T0, &done);
    asm.beqz(S4, &elem);
    asm.mv(A0, S5);
    asm.la(A1, "str_comma");
    asm.jal("concatString");
    asm.mv(S5, A0);
    asm.label(&elem);
    asm.slli(T0, S4, 2);
    asm.add(T0, S2, T0);
    asm.lw(A0, 0, T0);
    let conversions = [
        (1, "intToString"),
        (2, "floatToString"),
        (3, "boolToString"),
        (4, "charToString"),
    ];
    for (code, routine) in conversions {
        let skip = l(&format!("arrayJoin_not_{}", code));
        asm.li(T1, code);
        asm.bne(S3, T1, &skip);
        asm.jal(routine);
        asm.j(&append);
        asm.label(&skip);
    }
    asm.label(&append);
    asm.mv(A1, A0);
    asm.mv(A0, S5);
    asm.jal("concatString");
    asm.mv(S5, A0);
    asm.addi(S4, S4, 1);
    asm.j(&top);

    asm.label(&done);
    asm.mv(A0, S5);
    for (i, reg) in saved.iter().enumerate() {
        asm.lw(*reg, i as i64 * 4, Sp);
    }
    asm.addi(Sp, Sp, saved.len() as i64 * 4);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(instructions: &[Instruction]) -> Vec<String> {
        instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Label(l) => Some(l.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn requesting_pulls_in_dependencies_once() {
        let mut set = BuiltinSet::new();
        set.request("arrayJoin").unwrap();
        set.request("concatString").unwrap();
        assert_eq!(
            set.used(),
            &[
                "arrayJoin",
                "concatString",
                "intToString",
                "floatToString",
                "boolToString",
                "charToString"
            ]
        );
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        let mut set = BuiltinSet::new();
        assert_eq!(
            set.request("sqrt"),
            Err(CodegenErrorKind::UnknownBuiltin("sqrt".to_string()))
        );
        assert!(set.used().is_empty());
    }

    #[test]
    fn every_body_ends_in_ret() {
        let mut set = BuiltinSet::new();
        for entry in BUILTINS {
            set.request(entry.name).unwrap();
        }
        let code = set.materialize(false).unwrap();
        for entry in BUILTINS {
            let start = code
                .iter()
                .position(|i| *i == Instruction::Label(Label::new(entry.name)))
                .unwrap();
            let end = code[start + 1..]
                .iter()
                .position(|i| BUILTINS.iter().any(|b| *i == Instruction::Label(Label::new(b.name))))
                .map(|p| start + 1 + p)
                .unwrap_or(code.len());
            assert_eq!(code[end - 1].opcode(), Some(Opcode::Ret), "{}", entry.name);
        }
    }

    #[test]
    fn local_labels_are_unique() {
        let mut set = BuiltinSet::new();
        for entry in BUILTINS {
            set.request(entry.name).unwrap();
        }
        let all = labels(&set.materialize(false).unwrap());
        let mut deduped = all.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(all.len(), deduped.len());
    }

    #[test]
    fn calls_only_target_declared_dependencies() {
        for entry in BUILTINS {
            let mut asm = Assembler::new(false);
            (entry.emit)(&mut asm);
            for ins in asm.instructions() {
                if let Instruction::Op {
                    opcode: Opcode::Jal,
                    operands,
                } = ins
                {
                    let callee = operands[0].to_string();
                    assert!(
                        entry.requires.contains(&callee.as_str()),
                        "{} calls undeclared {}",
                        entry.name,
                        callee
                    );
                }
            }
        }
    }

    #[test]
    fn int_to_string_divides_unsigned_after_the_sign() {
        let mut asm = Assembler::new(false);
        int_to_string(&mut asm);
        let ops: Vec<Opcode> = asm.instructions().iter().filter_map(Instruction::opcode).collect();
        let neg = ops.iter().position(|op| *op == Opcode::Neg).unwrap();
        let remu = ops.iter().position(|op| *op == Opcode::Remu).unwrap();
        assert!(neg < remu);
        assert!(ops.contains(&Opcode::Divu));
        assert!(!ops.contains(&Opcode::Div) && !ops.contains(&Opcode::Rem));
    }

    #[test]
    fn guards_preserve_caller_temporaries() {
        for name in ["checkDivZero", "checkBounds"] {
            let mut asm = Assembler::new(false);
            (lookup(name).unwrap().emit)(&mut asm);
            for ins in asm.instructions() {
                if let Instruction::Op { opcode, operands } = ins {
                    if matches!(opcode, Opcode::Li | Opcode::La | Opcode::Mv) {
                        let dest = operands[0].to_string();
                        assert!(dest == "a0" || dest == "a7", "{} writes {}", name, dest);
                    }
                }
            }
        }
    }
}
