//! Performance benchmarks for `msp430_asm`.
//!
//! Measures:
//! - Single instruction latency
//! - Multi-instruction throughput (KB/s of source text)
//! - Label-heavy workloads
//! - Relocation patching
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use msp430_asm::{assemble, relocate, Assembler, RelocType};

// ─── Single-Instruction Latency ──────────────────────────────────────────────

fn bench_single_instruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_instruction");

    group.bench_function("nop", |b| b.iter(|| assemble(black_box("nop")).unwrap()));

    group.bench_function("mov_reg_reg", |b| {
        b.iter(|| assemble(black_box("mov r4, r5")).unwrap())
    });

    group.bench_function("mov_imm_abs", |b| {
        b.iter(|| assemble(black_box("mov #0x5a80, &0x0120")).unwrap())
    });

    group.bench_function("add_indexed_indexed", |b| {
        b.iter(|| assemble(black_box("add 2(r4), 6(r5)")).unwrap())
    });

    group.bench_function("bis_b_cg", |b| {
        b.iter(|| assemble(black_box("bis.b #1, &0x22")).unwrap())
    });

    group.bench_function("emulated_clr", |b| {
        b.iter(|| assemble(black_box("clr r15")).unwrap())
    });

    group.finish();
}

// ─── Multi-Instruction Throughput ─────────────────────────────────────────────

/// Generate a block of N instructions (no labels).
fn gen_block(n: usize) -> String {
    let mut s = String::with_capacity(n * 16);
    for i in 0..n {
        match i % 6 {
            0 => s.push_str("mov r4, r5\n"),
            1 => s.push_str("add #1, r6\n"),
            2 => s.push_str("sub.b @r7+, r8\n"),
            3 => s.push_str("xor #0x1234, r9\n"),
            4 => s.push_str("and 4(r10), r11\n"),
            _ => s.push_str("bis &0x0200, r12\n"),
        }
    }
    s
}

fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");

    for n in [100, 1000, 5000] {
        let src = gen_block(n);
        group.throughput(Throughput::Bytes(src.len() as u64));
        group.bench_function(format!("{n}_insn"), |b| {
            b.iter(|| assemble(black_box(&src)).unwrap())
        });
    }

    group.finish();
}

// ─── Label-Heavy Workloads ───────────────────────────────────────────────────

/// Generate `n_labels` labels, each followed by a backward and forward jump.
fn gen_label_heavy(n_labels: usize) -> String {
    let mut s = String::with_capacity(n_labels * 40);
    for i in 0..n_labels {
        s.push_str(&format!("l{i}:\n    dec r15\n    jnz l{i}\n"));
        if i + 1 < n_labels {
            s.push_str(&format!("    jmp l{}\n", i + 1));
        }
    }
    s
}

fn bench_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("labels");

    for n in [50, 200, 500] {
        let src = gen_label_heavy(n);
        group.bench_function(format!("{n}_labels"), |b| {
            b.iter(|| assemble(black_box(&src)).unwrap())
        });
    }

    group.finish();
}

// ─── Relocation Patching ─────────────────────────────────────────────────────

fn bench_relocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("relocate");

    group.bench_function("abs16", |b| {
        let mut buf = [0u8; 2];
        b.iter(|| relocate(&mut buf, 0, RelocType::Abs16.code(), black_box(0xC000)).unwrap())
    });

    group.bench_function("pcrel10", |b| {
        let mut buf = 0x3C00u16.to_le_bytes();
        b.iter(|| relocate(&mut buf, 0, RelocType::Pcrel10.code(), black_box(0x100)).unwrap())
    });

    group.finish();
}

// ─── Builder API vs One-Shot API ──────────────────────────────────────────────

fn bench_builder_vs_oneshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("api_comparison");

    let source = "mov #1, r4\nadd r4, r5\nsub r6, r7\nret";

    group.bench_function("oneshot_4_insn", |b| {
        b.iter(|| assemble(black_box(source)).unwrap())
    });

    group.bench_function("builder_4_insn_at_base", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.base_address(0xC000);
            asm.emit(black_box("mov #1, r4")).unwrap();
            asm.emit(black_box("add r4, r5")).unwrap();
            asm.emit(black_box("sub r6, r7")).unwrap();
            asm.emit(black_box("ret")).unwrap();
            let result = asm.finish().unwrap();
            black_box(result.bytes().len());
        })
    });

    group.finish();
}

// ─── Realistic Workloads ──────────────────────────────────────────────────────

fn bench_realistic(c: &mut Criterion) {
    let mut group = c.benchmark_group("realistic");

    let blink = "\
.equ WDTCTL, 0x0120
.equ P1DIR, 0x0022
.equ P1OUT, 0x0021
main:
    mov   #0x0400, sp
    mov   #0x5A80, &WDTCTL
    bis.b #1, &P1DIR
loop:
    xor.b #1, &P1OUT
    mov   #50000, r15
delay:
    dec   r15
    jnz   delay
    jmp   loop
";
    group.bench_function("blink", |b| {
        b.iter(|| assemble(black_box(blink)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_instruction,
    bench_throughput,
    bench_labels,
    bench_relocate,
    bench_builder_vs_oneshot,
    bench_realistic,
);
criterion_main!(benches);
