use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::adapter::{Adapter, Block, ElementKind};
use crate::config::{PipelineConfig, StagePlan};
use crate::error::Result;
use crate::stage::{Direction, Stage};
use crate::stream;

/// Problems with how the stages of a pipeline are connected. Stages are
/// numbered from 1, in declaration order.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WiringError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("{stages} stage(s) but {entries} wiring entries")]
    CountMismatch { stages: usize, entries: usize },
    #[error("stage {stage} names consumer {index}, but there are only {count} stages")]
    UnknownStage {
        stage: usize,
        index: usize,
        count: usize,
    },
    #[error("stage {producer} feeds stage {consumer} more than once")]
    DuplicateEdge { producer: usize, consumer: usize },
    #[error("stage {stage} has no consumers and is not the last stage, so no sink is assigned")]
    MissingSink { stage: usize },
    #[error("stage {stage} is the sink and cannot have consumers")]
    SinkHasConsumers { stage: usize },
    #[error("stage {stage} is fed by no other stage")]
    Unreachable { stage: usize },
    #[error("stages form a cycle")]
    Cycle,
    #[error("stage {producer} produces {produced}s, stage {consumer} accepts {accepted:?}")]
    IncompatibleType {
        producer: usize,
        consumer: usize,
        produced: ElementKind,
        accepted: Vec<ElementKind>,
    },
}

/// Check the shape of a wiring list: every stage's consumers, as 1-based
/// indices. The first stage is the source, the last one the sink.
pub fn check_topology(wiring: &[Vec<usize>]) -> std::result::Result<(), WiringError> {
    let count = wiring.len();
    if count == 0 {
        return Err(WiringError::Empty);
    }

    let mut producers = vec![0usize; count];
    for (i, consumers) in wiring.iter().enumerate() {
        let stage = i + 1;
        for (j, &index) in consumers.iter().enumerate() {
            if index == 0 || index > count {
                return Err(WiringError::UnknownStage {
                    stage,
                    index,
                    count,
                });
            }
            if consumers[..j].contains(&index) {
                return Err(WiringError::DuplicateEdge {
                    producer: stage,
                    consumer: index,
                });
            }
            producers[index - 1] += 1;
        }

        if stage == count && !consumers.is_empty() {
            return Err(WiringError::SinkHasConsumers { stage });
        }
        if stage != count && consumers.is_empty() {
            return Err(WiringError::MissingSink { stage });
        }
    }

    // Kahn's algorithm: everything must drain for the graph to be acyclic.
    let mut remaining = producers.clone();
    let mut ready: Vec<usize> = (0..count).filter(|&i| remaining[i] == 0).collect();
    let mut visited = 0;
    while let Some(i) = ready.pop() {
        visited += 1;
        for &index in &wiring[i] {
            remaining[index - 1] -= 1;
            if remaining[index - 1] == 0 {
                ready.push(index - 1);
            }
        }
    }
    if visited != count {
        return Err(WiringError::Cycle);
    }

    if let Some(i) = (1..count).find(|&i| producers[i] == 0) {
        return Err(WiringError::Unreachable { stage: i + 1 });
    }

    Ok(())
}

/// Check that every consumer can read what its producers emit, given each
/// stage's coding direction.
pub fn check_types(
    directions: &[Direction],
    wiring: &[Vec<usize>],
) -> std::result::Result<(), WiringError> {
    for (producer, consumers) in wiring.iter().enumerate() {
        for &index in consumers {
            let consumer = index - 1;
            bind(
                producer,
                consumer,
                directions[producer].output_kind(),
                &[directions[consumer].input_kind()],
            )?;
        }
    }
    Ok(())
}

fn bind(
    producer: usize,
    consumer: usize,
    produced: ElementKind,
    accepted: &[ElementKind],
) -> std::result::Result<Adapter, WiringError> {
    Adapter::bind(produced, accepted).ok_or_else(|| WiringError::IncompatibleType {
        producer: producer + 1,
        consumer: consumer + 1,
        produced,
        accepted: accepted.to_vec(),
    })
}

#[derive(Debug)]
struct Edge {
    consumer: usize,
    adapter: Adapter,
}

/// Counts gathered over one [`Pipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks_read: usize,
    pub elements_read: usize,
    pub elements_written: usize,
}

/// Bookkeeping for a run in progress.
struct Run<'w, W: Write> {
    sink: &'w mut W,
    /// Producers of each stage that have not finished yet.
    unfinished: Vec<usize>,
    /// Symbols reported by each stage's finished producers.
    upstream: Vec<usize>,
    summary: RunSummary,
}

/// Stages wired into a directed acyclic graph, fed from the first stage and
/// drained into the last.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    edges: Vec<Edge>,
    /// Edge indices leaving each stage, in declaration order.
    outgoing: Vec<Vec<usize>>,
    producers: Vec<usize>,
}

impl Pipeline {
    /// Wire `stages` according to `wiring`, the 1-based consumer list of each
    /// stage.
    pub fn new(
        stages: Vec<Stage>,
        wiring: &[Vec<usize>],
    ) -> std::result::Result<Self, WiringError> {
        if stages.len() != wiring.len() {
            return Err(WiringError::CountMismatch {
                stages: stages.len(),
                entries: wiring.len(),
            });
        }
        check_topology(wiring)?;

        let mut edges = Vec::new();
        let mut outgoing = vec![Vec::new(); stages.len()];
        let mut producers = vec![0; stages.len()];

        for (producer, consumers) in wiring.iter().enumerate() {
            for &index in consumers {
                let consumer = index - 1;
                let adapter = bind(
                    producer,
                    consumer,
                    stages[producer].output_kind(),
                    &stages[consumer].accepts(),
                )?;
                outgoing[producer].push(edges.len());
                producers[consumer] += 1;
                edges.push(Edge { consumer, adapter });
            }
        }

        log::info!(
            "Wired {} stage(s) with {} edge(s)",
            stages.len(),
            edges.len()
        );
        Ok(Self {
            stages,
            edges,
            outgoing,
            producers,
        })
    }

    /// Read a pipeline config and every stage config it names. `input` is
    /// the file the pipeline will read, used by stages that build their
    /// table from it.
    pub fn load(config: &Path, input: &Path) -> Result<Self> {
        let config = PipelineConfig::load(config)?;
        let wiring = config.wiring();
        check_topology(&wiring)?;

        let plans = config
            .stages
            .iter()
            .map(|entry| StagePlan::load(&entry.config))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let directions: Vec<Direction> = plans.iter().map(StagePlan::direction).collect();
        // Tables are only counted and written once the whole graph is known
        // to be sound.
        check_types(&directions, &wiring)?;

        let stages = plans
            .into_iter()
            .map(|plan| Stage::build(plan, input))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(stages, &wiring)?)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn source(&self) -> &Stage {
        &self.stages[0]
    }

    pub fn sink(&self) -> &Stage {
        &self.stages[self.stages.len() - 1]
    }

    /// Run `src` through the pipeline into `dst`.
    pub fn run_files(&mut self, src: &Path, dst: &Path) -> Result<RunSummary> {
        let input = BufReader::new(File::open(src)?);
        let mut output = BufWriter::new(File::create(dst)?);
        let summary = self.run(input, &mut output)?;
        output.flush()?;
        Ok(summary)
    }

    /// Drive the source stage over `input` block by block. Each block flows
    /// through every downstream stage before the next one is read.
    pub fn run<R: Read, W: Write>(&mut self, mut input: R, mut output: W) -> Result<RunSummary> {
        let kind = self.source().direction().input_kind();
        let block_size = self.source().block_size();
        let mut run = Run {
            sink: &mut output,
            unfinished: self.producers.clone(),
            upstream: vec![0; self.stages.len()],
            summary: RunSummary::default(),
        };

        while let Some(block) = stream::read_block(&mut input, kind, block_size)? {
            run.summary.blocks_read += 1;
            run.summary.elements_read += block.len();
            let coded = self.stages[0].code(block)?;
            self.forward(0, coded, &mut run)?;
        }
        self.finish(0, None, &mut run)?;
        run.sink.flush()?;

        let summary = run.summary;
        log::info!(
            "Read {} element(s) in {} block(s), wrote {} element(s)",
            summary.elements_read,
            summary.blocks_read,
            summary.elements_written
        );
        Ok(summary)
    }

    /// Hand a block produced by `stage` to each of its consumers, or to the
    /// sink file if it has none.
    fn forward<W: Write>(
        &mut self,
        stage: usize,
        block: Block,
        run: &mut Run<'_, W>,
    ) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }
        if self.outgoing[stage].is_empty() {
            stream::write_block(&mut *run.sink, &block)?;
            run.summary.elements_written += block.len();
            return Ok(());
        }
        for i in 0..self.outgoing[stage].len() {
            let edge = self.outgoing[stage][i];
            self.drive(edge, &block, run)?;
        }
        Ok(())
    }

    /// Let the consumer of `edge` pull `block` through the edge's adapter in
    /// pieces of its own block size, coding and forwarding each piece.
    fn drive<W: Write>(&mut self, edge: usize, block: &Block, run: &mut Run<'_, W>) -> Result<()> {
        let consumer = self.edges[edge].consumer;
        loop {
            let adapter = &mut self.edges[edge].adapter;
            let (input, exhausted) = self.stages[consumer].pull(adapter, block);
            if !input.is_empty() {
                let coded = self.stages[consumer].code(input)?;
                self.forward(consumer, coded, run)?;
            }
            if exhausted {
                return Ok(());
            }
        }
    }

    /// End the stream of `stage`: flush its tail, then finish every consumer
    /// whose producers are now all done.
    fn finish<W: Write>(
        &mut self,
        stage: usize,
        upstream: Option<usize>,
        run: &mut Run<'_, W>,
    ) -> Result<()> {
        let tail = self.stages[stage].finish(upstream)?;
        self.forward(stage, tail, run)?;

        let symbols = self.stages[stage].symbols();
        for i in 0..self.outgoing[stage].len() {
            let consumer = self.edges[self.outgoing[stage][i]].consumer;
            run.upstream[consumer] += symbols;
            run.unfinished[consumer] -= 1;
            if run.unfinished[consumer] == 0 {
                let reported = run.upstream[consumer];
                self.finish(consumer, Some(reported), run)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::StageConfig;
    use crate::error::Error;
    use crate::example::{example_table, run_length};

    fn stage(direction: Direction, n: usize, block: usize) -> Stage {
        Stage::new(
            format!("{direction}"),
            StageConfig {
                direction,
                block_size: run_length(block),
                text_len: None,
                table: example_table(n),
            },
        )
    }

    #[test]
    fn test_topology_errors() {
        assert_eq!(check_topology(&[]), Err(WiringError::Empty));
        assert_eq!(
            check_topology(&[vec![3], vec![]]),
            Err(WiringError::UnknownStage {
                stage: 1,
                index: 3,
                count: 2
            })
        );
        assert_eq!(
            check_topology(&[vec![0], vec![]]),
            Err(WiringError::UnknownStage {
                stage: 1,
                index: 0,
                count: 2
            })
        );
        assert_eq!(
            check_topology(&[vec![2, 2], vec![]]),
            Err(WiringError::DuplicateEdge {
                producer: 1,
                consumer: 2
            })
        );
        assert_eq!(
            check_topology(&[vec![], vec![]]),
            Err(WiringError::MissingSink { stage: 1 })
        );
        assert_eq!(
            check_topology(&[vec![2], vec![1]]),
            Err(WiringError::SinkHasConsumers { stage: 2 })
        );
        assert_eq!(
            check_topology(&[vec![2], vec![3], vec![]]),
            Ok(())
        );
        assert_eq!(
            check_topology(&[vec![3], vec![3], vec![]]),
            Err(WiringError::Unreachable { stage: 2 })
        );
        assert_eq!(
            check_topology(&[vec![2], vec![3], vec![2], vec![]]),
            Err(WiringError::Cycle)
        );
    }

    #[test]
    fn test_type_errors() {
        use Direction::{Decode, Encode};
        assert_eq!(check_types(&[Encode, Decode], &[vec![2], vec![]]), Ok(()));
        assert_eq!(
            check_types(&[Encode, Decode, Decode], &[vec![2], vec![3], vec![]]),
            Err(WiringError::IncompatibleType {
                producer: 2,
                consumer: 3,
                produced: ElementKind::Symbol,
                accepted: vec![ElementKind::Codeword],
            })
        );
    }

    #[test]
    fn test_single_stage_is_valid() {
        assert_eq!(check_topology(&[vec![]]), Ok(()));
    }

    #[test]
    fn test_incompatible_edge() {
        let stages = vec![stage(Direction::Encode, 1, 4), stage(Direction::Encode, 1, 4)];
        let error = Pipeline::new(stages, &[vec![2], vec![]]).unwrap_err();
        assert_eq!(
            error,
            WiringError::IncompatibleType {
                producer: 1,
                consumer: 2,
                produced: ElementKind::Codeword,
                accepted: vec![ElementKind::Symbol],
            }
        );
    }

    #[test]
    fn test_single_stage_writes_straight_to_sink() {
        let mut pipeline = Pipeline::new(vec![stage(Direction::Encode, 2, 3)], &[vec![]]).unwrap();
        let mut output = Vec::new();
        let summary = pipeline.run(&b"abcab"[..], &mut output).unwrap();

        assert_eq!(summary.blocks_read, 2);
        assert_eq!(summary.elements_read, 5);
        // ab, ca, b
        assert_eq!(summary.elements_written, 3);
        assert_eq!(output.len(), 3 * 8);
        assert_eq!(output[..8], 0.3125f64.to_be_bytes());
    }

    #[test]
    fn test_encode_then_decode() {
        let stages = vec![stage(Direction::Encode, 2, 3), stage(Direction::Decode, 2, 2)];
        let mut pipeline = Pipeline::new(stages, &[vec![2], vec![]]).unwrap();
        let mut output = Vec::new();
        let message = b"abcabcbbacaab";
        pipeline.run(&message[..], &mut output).unwrap();
        assert_eq!(output, message);
    }

    #[test]
    fn test_fan_out_and_in() {
        // 1 encodes, 2 and 3 decode the same codewords, 4 re-encodes both.
        let stages = vec![
            stage(Direction::Encode, 1, 4),
            stage(Direction::Decode, 1, 3),
            stage(Direction::Decode, 1, 5),
            stage(Direction::Encode, 1, 2),
        ];
        let wiring = [vec![2, 3], vec![4], vec![4], vec![]];
        let mut pipeline = Pipeline::new(stages, &wiring).unwrap();
        let mut output = Vec::new();
        let summary = pipeline.run(&b"abc"[..], &mut output).unwrap();
        // Both branches deliver every symbol to the sink.
        assert_eq!(summary.elements_written, 6);

        // Each branch holds back its last codeword until the source ends, so
        // "ab" arrives once per branch before either "c".
        let codewords: Vec<f64> = output
            .chunks_exact(8)
            .map(|chunk| f64::from_be_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(codewords, vec![0.25, 0.625, 0.25, 0.625, 0.875, 0.875]);
    }

    #[test]
    fn test_decode_error_aborts_run() {
        let mut pipeline = Pipeline::new(vec![stage(Direction::Decode, 1, 4)], &[vec![]]).unwrap();
        let input = 7.5f64.to_be_bytes();
        let error = pipeline.run(&input[..], Vec::new()).unwrap_err();
        assert!(matches!(error, Error::Decode(_)));
    }
}
