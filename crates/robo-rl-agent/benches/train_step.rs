//! Benchmark for one DQN training step
//!
//! A tick that triggers training pays for one of these, so it bounds tick
//! latency.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use robo_rl_agent::{DqnAgent, DqnConfig};
use robo_rl_core::{AgentConfig, Transition};

const INPUT_DIM: usize = 17;
const NUM_ACTIONS: usize = 28;

fn filled_agent(batch_size: usize) -> DqnAgent {
    let config = DqnConfig {
        base: AgentConfig {
            batch_size,
            buffer_size: 1000,
            ..AgentConfig::default()
        },
        checkpoint_path: None,
        seed: Some(0),
        ..DqnConfig::default()
    };
    let mut agent = DqnAgent::new(config, INPUT_DIM, NUM_ACTIONS).unwrap();
    for i in 0..1000 {
        #[allow(clippy::cast_precision_loss)]
        let x = (i % 97) as f32 / 97.0;
        let state = vec![x; INPUT_DIM];
        let next_state = vec![1.0 - x; INPUT_DIM];
        agent
            .remember(Transition::new(state, i % NUM_ACTIONS, -0.1, next_state, i % 50 == 0))
            .unwrap();
    }
    agent
}

fn bench_train_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("dqn_train_step");

    for batch_size in [32, 64, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let mut agent = filled_agent(batch_size);
                b.iter(|| black_box(agent.train_step(black_box(batch_size)).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_select_action(c: &mut Criterion) {
    let mut agent = filled_agent(32);
    agent.set_epsilon(0.0);
    let features = vec![0.25; INPUT_DIM];

    c.bench_function("dqn_select_action", |b| {
        b.iter(|| black_box(agent.select_action(black_box(&features)).unwrap()));
    });
}

criterion_group!(benches, bench_train_step, bench_select_action);
criterion_main!(benches);
