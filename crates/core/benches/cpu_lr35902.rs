use brick_core::cpu_lr35902::{CpuLr35902, MemoryLr35902};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Simple memory implementation for benchmarking
struct BenchMemory {
    ram: Vec<u8>,
}

impl BenchMemory {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];

        // Write a small arithmetic loop at the entry point 0x0100
        // LD A,0x42 ; 3E 42
        ram[0x0100] = 0x3E;
        ram[0x0101] = 0x42;
        // LD (0xC000),A ; EA 00 C0
        ram[0x0102] = 0xEA;
        ram[0x0103] = 0x00;
        ram[0x0104] = 0xC0;
        // LD B,0x10 ; 06 10
        ram[0x0105] = 0x06;
        ram[0x0106] = 0x10;
        // INC B ; 04
        ram[0x0107] = 0x04;
        // DEC B ; 05
        ram[0x0108] = 0x05;
        // ADD A,B ; 80
        ram[0x0109] = 0x80;
        // SWAP A (CB 37)
        ram[0x010A] = 0xCB;
        ram[0x010B] = 0x37;
        // JP 0x0100 ; C3 00 01 (loop back)
        ram[0x010C] = 0xC3;
        ram[0x010D] = 0x00;
        ram[0x010E] = 0x01;

        Self { ram }
    }
}

impl MemoryLr35902 for BenchMemory {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_lr35902_step");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            let mut cpu = CpuLr35902::new(BenchMemory::new());
            cpu.reset();
            cpu.step();
            black_box(cpu.a);
        });
    });

    group.finish();
}

fn bench_cpu_multiple_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_lr35902_multiple_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                b.iter(|| {
                    let mut cpu = CpuLr35902::new(BenchMemory::new());
                    cpu.reset();
                    for _ in 0..count {
                        cpu.step();
                    }
                    black_box(cpu.cycles);
                });
            },
        );
    }

    group.finish();
}

fn bench_cpu_reset(c: &mut Criterion) {
    c.bench_function("cpu_lr35902_reset", |b| {
        let mut cpu = CpuLr35902::new(BenchMemory::new());
        b.iter(|| {
            cpu.reset();
            black_box(cpu.pc);
        });
    });
}

criterion_group!(benches, bench_cpu_step, bench_cpu_multiple_steps, bench_cpu_reset);
criterion_main!(benches);
