//! Benchmarks for destination wave planning and execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use donkey::chain::{self, ChainMember};
use donkey::connector::{DestinationConnector, DestinationContext, SendOutcome};
use donkey::domain::destination_chain::{plan, DestinationPlanInput};
use donkey::domain::source_map::SourceMap;
use donkey::domain_types::{ChannelId, ConnectorStatus, MessageId, MetaDataId};
use donkey::error::TransportError;
use donkey::executor::{Executor, PassThroughExecutor};

struct ImmediateDestination;

#[async_trait]
impl DestinationConnector for ImmediateDestination {
    async fn send(&self, _context: &DestinationContext, _content: &[u8]) -> Result<SendOutcome, TransportError> {
        Ok(SendOutcome { status: ConnectorStatus::Sent, response: None })
    }
}

fn bench_wave_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("wave_planning");
    for destination_count in [1, 10, 50, 200] {
        let inputs: Vec<DestinationPlanInput> = (0..destination_count)
            .map(|i| DestinationPlanInput {
                metadata_id: MetaDataId::try_new(i + 1).unwrap(),
                wait_for_previous: i % 5 == 0,
                skip_on_upstream_error: false,
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::new("plan", destination_count),
            &inputs,
            |b, inputs| {
                b.iter(|| black_box(plan(inputs)));
            },
        );
    }
    group.finish();
}

fn bench_wave_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("wave_execution");
    group.measurement_time(Duration::from_secs(5));

    for destination_count in [1, 10, 50] {
        let inputs: Vec<DestinationPlanInput> = (0..destination_count)
            .map(|i| DestinationPlanInput {
                metadata_id: MetaDataId::try_new(i + 1).unwrap(),
                wait_for_previous: false,
                skip_on_upstream_error: false,
            })
            .collect();
        let waves = plan(&inputs);
        let members: Vec<ChainMember> = inputs
            .iter()
            .map(|input| ChainMember {
                metadata_id: input.metadata_id,
                connector: Arc::new(ImmediateDestination) as Arc<dyn DestinationConnector>,
                skip_on_upstream_error: input.skip_on_upstream_error,
            })
            .collect();

        let executor: Arc<dyn Executor> = Arc::new(PassThroughExecutor);
        let context = DestinationContext {
            channel: ChannelId::generate(),
            message_id: MessageId::first(),
            source_map: SourceMap::default(),
        };

        group.bench_with_input(
            BenchmarkId::new("execute", destination_count),
            &(waves, members),
            |b, (waves, members)| {
                b.to_async(&rt).iter(|| async {
                    black_box(chain::execute(waves, members, b"payload", &executor, &context).await)
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_wave_planning, bench_wave_execution);
criterion_main!(benches);
