//! In-memory model of the emitted RISC-V text.
//!
//! Instructions are kept structured until the very end so tests can inspect
//! opcodes and operands instead of grepping strings.

use std::fmt;

/// Integer registers used by the fixed calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Zero,
    Ra,
    Sp,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    A0,
    A1,
    A2,
    A7,
    S1,
    S2,
    S3,
    S4,
    S5,
}

impl Register {
    /// Heap pointer: next free byte of the bump heap.
    pub const HP: Register = Register::T6;

    pub fn name(self) -> &'static str {
        match self {
            Register::Zero => "zero",
            Register::Ra => "ra",
            Register::Sp => "sp",
            Register::T0 => "t0",
            Register::T1 => "t1",
            Register::T2 => "t2",
            Register::T3 => "t3",
            Register::T4 => "t4",
            Register::T5 => "t5",
            Register::T6 => "t6",
            Register::A0 => "a0",
            Register::A1 => "a1",
            Register::A2 => "a2",
            Register::A7 => "a7",
            Register::S1 => "s1",
            Register::S2 => "s2",
            Register::S3 => "s3",
            Register::S4 => "s4",
            Register::S5 => "s5",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Single-precision float registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FRegister {
    Ft0,
    Ft1,
    Ft2,
    Ft3,
    Fa0,
}

impl fmt::Display for FRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FRegister::Ft0 => "ft0",
            FRegister::Ft1 => "ft1",
            FRegister::Ft2 => "ft2",
            FRegister::Ft3 => "ft3",
            FRegister::Fa0 => "fa0",
        })
    }
}

/// A jump target inside the text section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Register),
    FReg(FRegister),
    Imm(i64),
    /// `offset(base)` addressing.
    Mem { offset: i64, base: Register },
    Label(Label),
    /// Data labels, builtin names and rounding modes.
    Symbol(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::FReg(r) => write!(f, "{}", r),
            Operand::Imm(n) => write!(f, "{}", n),
            Operand::Mem { offset, base } => write!(f, "{}({})", offset, base),
            Operand::Label(l) => write!(f, "{}", l),
            Operand::Symbol(s) => f.write_str(s),
        }
    }
}

impl From<Register> for Operand {
    fn from(r: Register) -> Self {
        Operand::Reg(r)
    }
}

impl From<FRegister> for Operand {
    fn from(r: FRegister) -> Self {
        Operand::FReg(r)
    }
}

impl From<&Label> for Operand {
    fn from(l: &Label) -> Self {
        Operand::Label(l.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Integer arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Divu,
    Remu,
    Addi,
    Neg,
    Slli,
    // Logic and comparison
    Andi,
    Xor,
    Xori,
    Slt,
    Seqz,
    Snez,
    // Moves and memory
    Li,
    La,
    Mv,
    Lw,
    Sw,
    Lb,
    Sb,
    // Branches and jumps
    Beq,
    Bne,
    Blt,
    Bge,
    Bgt,
    Beqz,
    Bnez,
    Bgez,
    Bltz,
    J,
    Jal,
    Ret,
    Ecall,
    // Single-precision floats
    FaddS,
    FsubS,
    FmulS,
    FdivS,
    FnegS,
    FabsS,
    FeqS,
    FltS,
    FleS,
    FcvtSW,
    FcvtWS,
    FmvWX,
    FmvXW,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::Divu => "divu",
            Opcode::Remu => "remu",
            Opcode::Addi => "addi",
            Opcode::Neg => "neg",
            Opcode::Slli => "slli",
            Opcode::Andi => "andi",
            Opcode::Xor => "xor",
            Opcode::Xori => "xori",
            Opcode::Slt => "slt",
            Opcode::Seqz => "seqz",
            Opcode::Snez => "snez",
            Opcode::Li => "li",
            Opcode::La => "la",
            Opcode::Mv => "mv",
            Opcode::Lw => "lw",
            Opcode::Sw => "sw",
            Opcode::Lb => "lb",
            Opcode::Sb => "sb",
            Opcode::Beq => "beq",
            Opcode::Bne => "bne",
            Opcode::Blt => "blt",
            Opcode::Bge => "bge",
            Opcode::Bgt => "bgt",
            Opcode::Beqz => "beqz",
            Opcode::Bnez => "bnez",
            Opcode::Bgez => "bgez",
            Opcode::Bltz => "bltz",
            Opcode::J => "j",
            Opcode::Jal => "jal",
            Opcode::Ret => "ret",
            Opcode::Ecall => "ecall",
            Opcode::FaddS => "fadd.s",
            Opcode::FsubS => "fsub.s",
            Opcode::FmulS => "fmul.s",
            Opcode::FdivS => "fdiv.s",
            Opcode::FnegS => "fneg.s",
            Opcode::FabsS => "fabs.s",
            Opcode::FeqS => "feq.s",
            Opcode::FltS => "flt.s",
            Opcode::FleS => "fle.s",
            Opcode::FcvtSW => "fcvt.s.w",
            Opcode::FcvtWS => "fcvt.w.s",
            Opcode::FmvWX => "fmv.w.x",
            Opcode::FmvXW => "fmv.x.w",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Op {
        opcode: Opcode,
        operands: Vec<Operand>,
    },
    Label(Label),
    Comment(String),
}

impl Instruction {
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Instruction::Op { opcode, .. } => Some(*opcode),
            _ => None,
        }
    }

    /// True for `op` whose operands render exactly as `text`, e.g. `is(Opcode::Addi, "sp, sp, 8")`.
    pub fn is(&self, op: Opcode, text: &str) -> bool {
        match self {
            Instruction::Op { opcode, operands } => {
                *opcode == op
                    && operands
                        .iter()
                        .map(|o| o.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                        == text
            }
            _ => false,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Op { opcode, operands } => {
                write!(f, "    {}", opcode.mnemonic())?;
                for (i, operand) in operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}{}", sep, operand)?;
                }
                Ok(())
            }
            Instruction::Label(label) => write!(f, "{}:", label),
            Instruction::Comment(text) => write!(f, "    # {}", text),
        }
    }
}

/// Append-only instruction buffer with one helper per mnemonic.
#[derive(Debug, Clone)]
pub struct Assembler {
    instructions: Vec<Instruction>,
    comments: bool,
}

impl Assembler {
    pub fn new(comments: bool) -> Self {
        Self {
            instructions: Vec::new(),
            comments,
        }
    }

    pub fn emit(&mut self, opcode: Opcode, operands: Vec<Operand>) {
        self.instructions.push(Instruction::Op { opcode, operands });
    }

    pub fn label(&mut self, label: &Label) {
        self.instructions.push(Instruction::Label(label.clone()));
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        if self.comments {
            self.instructions.push(Instruction::Comment(text.into()));
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    // ---------------------------------------------------------------------
    // Integer
    // ---------------------------------------------------------------------

    fn rrr(&mut self, op: Opcode, rd: Register, rs1: Register, rs2: Register) {
        self.emit(op, vec![rd.into(), rs1.into(), rs2.into()]);
    }

    fn rri(&mut self, op: Opcode, rd: Register, rs: Register, imm: i64) {
        self.emit(op, vec![rd.into(), rs.into(), Operand::Imm(imm)]);
    }

    pub fn add(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Add, rd, rs1, rs2);
    }

    pub fn sub(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Sub, rd, rs1, rs2);
    }

    pub fn mul(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Mul, rd, rs1, rs2);
    }

    pub fn div(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Div, rd, rs1, rs2);
    }

    pub fn rem(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Rem, rd, rs1, rs2);
    }

    pub fn divu(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Divu, rd, rs1, rs2);
    }

    pub fn remu(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Remu, rd, rs1, rs2);
    }

    pub fn xor(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Xor, rd, rs1, rs2);
    }

    pub fn slt(&mut self, rd: Register, rs1: Register, rs2: Register) {
        self.rrr(Opcode::Slt, rd, rs1, rs2);
    }

    pub fn addi(&mut self, rd: Register, rs: Register, imm: i64) {
        self.rri(Opcode::Addi, rd, rs, imm);
    }

    pub fn andi(&mut self, rd: Register, rs: Register, imm: i64) {
        self.rri(Opcode::Andi, rd, rs, imm);
    }

    pub fn xori(&mut self, rd: Register, rs: Register, imm: i64) {
        self.rri(Opcode::Xori, rd, rs, imm);
    }

    pub fn slli(&mut self, rd: Register, rs: Register, shamt: i64) {
        self.rri(Opcode::Slli, rd, rs, shamt);
    }

    pub fn neg(&mut self, rd: Register, rs: Register) {
        self.emit(Opcode::Neg, vec![rd.into(), rs.into()]);
    }

    pub fn seqz(&mut self, rd: Register, rs: Register) {
        self.emit(Opcode::Seqz, vec![rd.into(), rs.into()]);
    }

    pub fn snez(&mut self, rd: Register, rs: Register) {
        self.emit(Opcode::Snez, vec![rd.into(), rs.into()]);
    }

    pub fn li(&mut self, rd: Register, imm: i64) {
        self.emit(Opcode::Li, vec![rd.into(), Operand::Imm(imm)]);
    }

    pub fn la(&mut self, rd: Register, symbol: &str) {
        self.emit(Opcode::La, vec![rd.into(), Operand::Symbol(symbol.to_string())]);
    }

    pub fn mv(&mut self, rd: Register, rs: Register) {
        self.emit(Opcode::Mv, vec![rd.into(), rs.into()]);
    }

    pub fn lw(&mut self, rd: Register, offset: i64, base: Register) {
        self.emit(Opcode::Lw, vec![rd.into(), Operand::Mem { offset, base }]);
    }

    pub fn sw(&mut self, rs: Register, offset: i64, base: Register) {
        self.emit(Opcode::Sw, vec![rs.into(), Operand::Mem { offset, base }]);
    }

    pub fn lb(&mut self, rd: Register, offset: i64, base: Register) {
        self.emit(Opcode::Lb, vec![rd.into(), Operand::Mem { offset, base }]);
    }

    pub fn sb(&mut self, rs: Register, offset: i64, base: Register) {
        self.emit(Opcode::Sb, vec![rs.into(), Operand::Mem { offset, base }]);
    }

    // ---------------------------------------------------------------------
    // Control
    // ---------------------------------------------------------------------

    fn branch(&mut self, op: Opcode, rs1: Register, rs2: Register, target: &Label) {
        self.emit(op, vec![rs1.into(), rs2.into(), target.into()]);
    }

    pub fn beq(&mut self, rs1: Register, rs2: Register, target: &Label) {
        self.branch(Opcode::Beq, rs1, rs2, target);
    }

    pub fn bne(&mut self, rs1: Register, rs2: Register, target: &Label) {
        self.branch(Opcode::Bne, rs1, rs2, target);
    }

    pub fn blt(&mut self, rs1: Register, rs2: Register, target: &Label) {
        self.branch(Opcode::Blt, rs1, rs2, target);
    }

    pub fn bge(&mut self, rs1: Register, rs2: Register, target: &Label) {
        self.branch(Opcode::Bge, rs1, rs2, target);
    }

    pub fn bgt(&mut self, rs1: Register, rs2: Register, target: &Label) {
        self.branch(Opcode::Bgt, rs1, rs2, target);
    }

    pub fn beqz(&mut self, rs: Register, target: &Label) {
        self.emit(Opcode::Beqz, vec![rs.into(), target.into()]);
    }

    pub fn bnez(&mut self, rs: Register, target: &Label) {
        self.emit(Opcode::Bnez, vec![rs.into(), target.into()]);
    }

    pub fn bgez(&mut self, rs: Register, target: &Label) {
        self.emit(Opcode::Bgez, vec![rs.into(), target.into()]);
    }

    pub fn bltz(&mut self, rs: Register, target: &Label) {
        self.emit(Opcode::Bltz, vec![rs.into(), target.into()]);
    }

    pub fn j(&mut self, target: &Label) {
        self.emit(Opcode::J, vec![target.into()]);
    }

    /// Call a builtin by name; the return address lands in `ra`.
    pub fn jal(&mut self, routine: &str) {
        self.emit(Opcode::Jal, vec![Operand::Symbol(routine.to_string())]);
    }

    pub fn ret(&mut self) {
        self.emit(Opcode::Ret, vec![]);
    }

    pub fn ecall(&mut self) {
        self.emit(Opcode::Ecall, vec![]);
    }

    /// `li a7, service; ecall`
    pub fn syscall(&mut self, service: i64) {
        self.li(Register::A7, service);
        self.ecall();
    }

    // ---------------------------------------------------------------------
    // Stack
    // ---------------------------------------------------------------------

    pub fn push(&mut self, rs: Register) {
        self.addi(Register::Sp, Register::Sp, -4);
        self.sw(rs, 0, Register::Sp);
    }

    pub fn pop(&mut self, rd: Register) {
        self.lw(rd, 0, Register::Sp);
        self.addi(Register::Sp, Register::Sp, 4);
    }

    /// Release `bytes` of stack; nothing is emitted for zero.
    pub fn release(&mut self, bytes: i64) {
        if bytes > 0 {
            self.addi(Register::Sp, Register::Sp, bytes);
        }
    }

    // ---------------------------------------------------------------------
    // Floats
    // ---------------------------------------------------------------------

    pub fn fop(&mut self, op: Opcode, fd: FRegister, fs1: FRegister, fs2: FRegister) {
        self.emit(op, vec![fd.into(), fs1.into(), fs2.into()]);
    }

    /// `feq.s` / `flt.s` / `fle.s` into an integer register.
    pub fn fcmp(&mut self, op: Opcode, rd: Register, fs1: FRegister, fs2: FRegister) {
        self.emit(op, vec![rd.into(), fs1.into(), fs2.into()]);
    }

    pub fn fneg(&mut self, fd: FRegister, fs: FRegister) {
        self.emit(Opcode::FnegS, vec![fd.into(), fs.into()]);
    }

    pub fn fabs(&mut self, fd: FRegister, fs: FRegister) {
        self.emit(Opcode::FabsS, vec![fd.into(), fs.into()]);
    }

    /// Reinterpret the bits of `rs` as a float.
    pub fn fmv_w_x(&mut self, fd: FRegister, rs: Register) {
        self.emit(Opcode::FmvWX, vec![fd.into(), rs.into()]);
    }

    /// Reinterpret the bits of `fs` as an integer.
    pub fn fmv_x_w(&mut self, rd: Register, fs: FRegister) {
        self.emit(Opcode::FmvXW, vec![rd.into(), fs.into()]);
    }

    pub fn fcvt_s_w(&mut self, fd: FRegister, rs: Register) {
        self.emit(Opcode::FcvtSW, vec![fd.into(), rs.into()]);
    }

    /// Convert to integer rounding toward zero.
    pub fn fcvt_w_s(&mut self, rd: Register, fs: FRegister) {
        self.emit(
            Opcode::FcvtWS,
            vec![rd.into(), fs.into(), Operand::Symbol("rtz".to_string())],
        );
    }
}
