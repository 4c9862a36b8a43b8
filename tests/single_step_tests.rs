//! Runs the community single-step Z80 test vectors
//! (<https://github.com/SingleStepTests/z80>, one JSON file per opcode,
//! each holding a list of `{name, initial, final, cycles}` cases) if a copy
//! is present on disk. Skips gracefully otherwise — these vectors are large
//! (tens of thousands of cases) and are not vendored into this repository.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use z80_core::{SimpleBus, Z80};

#[derive(Debug, Deserialize)]
struct VectorState {
    pc: u16,
    sp: u16,
    a: u8,
    f: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,
    #[serde(default)]
    ix: u16,
    #[serde(default)]
    iy: u16,
    #[serde(default)]
    i: u8,
    #[serde(default)]
    r: u8,
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Deserialize)]
struct VectorCase {
    name: String,
    #[serde(rename = "initial")]
    initial: VectorState,
    #[serde(rename = "final")]
    expected: VectorState,
    cycles: Vec<serde_json::Value>,
}

fn vectors_dir() -> Option<PathBuf> {
    let dir = std::env::var("Z80_SINGLE_STEP_VECTORS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/vectors/z80"));
    dir.is_dir().then_some(dir)
}

fn apply(cpu: &mut Z80, bus: &mut SimpleBus, state: &VectorState) {
    cpu.set_pc(state.pc);
    cpu.set_sp(state.sp);
    cpu.set_a(state.a);
    cpu.set_f(state.f);
    cpu.set_bc(u16::from(state.b) << 8 | u16::from(state.c));
    cpu.set_de(u16::from(state.d) << 8 | u16::from(state.e));
    cpu.set_hl(u16::from(state.h) << 8 | u16::from(state.l));
    cpu.set_ix(state.ix);
    cpu.set_iy(state.iy);
    for &(addr, value) in &state.ram {
        bus.load(addr, &[value]);
    }
}

fn check(cpu: &Z80, bus: &SimpleBus, expected: &VectorState, case_name: &str) {
    let regs = cpu.registers();
    assert_eq!(cpu.pc(), expected.pc, "{case_name}: PC");
    assert_eq!(cpu.sp(), expected.sp, "{case_name}: SP");
    assert_eq!(regs.a, expected.a, "{case_name}: A");
    assert_eq!(regs.f, expected.f, "{case_name}: F");
    assert_eq!(regs.b, expected.b, "{case_name}: B");
    assert_eq!(regs.c, expected.c, "{case_name}: C");
    assert_eq!(regs.d, expected.d, "{case_name}: D");
    assert_eq!(regs.e, expected.e, "{case_name}: E");
    assert_eq!(regs.h, expected.h, "{case_name}: H");
    assert_eq!(regs.l, expected.l, "{case_name}: L");
    for &(addr, value) in &expected.ram {
        assert_eq!(bus.peek(addr), value, "{case_name}: RAM[{addr:#06X}]");
    }
}

#[test]
fn single_step_vectors() {
    let Some(dir) = vectors_dir() else {
        eprintln!("Z80_SINGLE_STEP_VECTORS not set and tests/vectors/z80 absent; skipping");
        return;
    };

    let mut failures: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;

    for entry in std::fs::read_dir(&dir).expect("read vectors dir") {
        let entry = entry.expect("dir entry");
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read_to_string(entry.path()).expect("read vector file");
        let cases: Vec<VectorCase> = serde_json::from_str(&raw).expect("parse vector file");

        for case in &cases {
            total += 1;
            let mut bus = SimpleBus::new();
            let mut io = SimpleBus::new();
            let mut cpu = Z80::new();
            apply(&mut cpu, &mut bus, &case.initial);

            let t_states = u32::try_from(case.cycles.len()).unwrap_or(0);
            let mut ok = true;
            for _ in 0..t_states {
                if cpu.clock(&mut bus, &mut io).is_err() {
                    ok = false;
                    break;
                }
            }
            if ok {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    check(&cpu, &bus, &case.expected, &case.name);
                }));
                ok = result.is_ok();
            }
            if !ok {
                *failures.entry(entry.path().display().to_string()).or_insert(0) += 1;
            }
        }
    }

    assert_eq!(
        failures.values().sum::<usize>(),
        0,
        "{} of {total} single-step cases failed across files: {failures:?}",
        failures.values().sum::<usize>(),
    );
}
