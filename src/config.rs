//! Line-oriented configuration files.
//!
//! Every file shares one grammar: a directive followed by its arguments,
//! separated by any mix of whitespace, `:` and `=`. Blank lines and lines
//! starting with `#` are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::model::{ProbabilityTable, Symbol, TableError};
use crate::stage::Direction;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },
    #[error("cannot write {}: {source}", path.display())]
    Unwritable { path: PathBuf, source: io::Error },
    #[error("{}:{line}: {reason} in `{text}`", file.display())]
    Line {
        file: PathBuf,
        line: usize,
        text: String,
        reason: LineError,
    },
    #[error("{}: missing `{key}`", file.display())]
    Missing { file: PathBuf, key: &'static str },
    #[error("{}: {source}", file.display())]
    Table { file: PathBuf, source: TableError },
}

/// What is wrong with a single configuration line.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LineError {
    #[error("`{directive}` takes {expected} argument(s), found {found}")]
    Arity {
        directive: String,
        expected: usize,
        found: usize,
    },
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("symbol `{0}` is outside -128..=255")]
    InvalidSymbol(String),
    #[error("probability {0} is outside (0, 1]")]
    InvalidProbability(f64),
    #[error("unknown target `{0}`, expected encode|decode")]
    UnknownTarget(String),
    #[error("unknown table method `{0}`, expected read|write")]
    UnknownTableMethod(String),
    #[error("`{0}` is not allowed in a table file")]
    NotInTable(String),
    #[error("`table` must be set before `table_method`")]
    MissingTablePath,
    #[error("`num` must be set before the table is written")]
    MissingRunLength,
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Non-empty, non-comment lines of `text` with their 1-based line numbers,
/// split into words.
fn lines(text: &str) -> impl Iterator<Item = (usize, &str, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let words: Vec<&str> = trimmed
            .split(|c: char| c.is_whitespace() || c == ':' || c == '=')
            .filter(|word| !word.is_empty())
            .collect();
        Some((i + 1, line, words)).filter(|(_, _, words)| !words.is_empty())
    })
}

fn line_error(file: &Path, line: usize, text: &str, reason: LineError) -> ConfigError {
    ConfigError::Line {
        file: file.to_path_buf(),
        line,
        text: text.to_string(),
        reason,
    }
}

fn number<T: FromStr>(word: &str) -> Result<T, LineError> {
    word.parse()
        .map_err(|_| LineError::InvalidNumber(word.to_string()))
}

fn symbol(word: &str) -> Result<Symbol, LineError> {
    match word.parse::<i16>() {
        Ok(value @ 0..=255) => Ok(value as Symbol),
        // Signed-byte spelling.
        Ok(value @ -128..=-1) => Ok(value as i8 as Symbol),
        _ => Err(LineError::InvalidSymbol(word.to_string())),
    }
}

fn arity(words: &[&str], expected: usize) -> Result<(), LineError> {
    let found = words.len() - 1;
    if found != expected {
        return Err(LineError::Arity {
            directive: words[0].to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Paths of the files a run works on.
#[derive(Debug, Clone, PartialEq)]
pub struct MainConfig {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub conf: PathBuf,
    pub log: Option<PathBuf>,
}

impl MainConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?, path)
    }

    pub fn parse(text: &str, file: &Path) -> Result<Self, ConfigError> {
        let (mut src, mut dst, mut conf, mut log) = (None, None, None, None);

        for (line, raw, words) in lines(text) {
            arity(&words, 1).map_err(|e| line_error(file, line, raw, e))?;
            let value = Some(PathBuf::from(words[1]));
            match words[0] {
                "src" => src = value,
                "dst" => dst = value,
                "conf" => conf = value,
                "log" => log = value,
                other => {
                    let reason = LineError::UnknownDirective(other.to_string());
                    return Err(line_error(file, line, raw, reason));
                }
            }
        }

        let missing = |key| ConfigError::Missing {
            file: file.to_path_buf(),
            key,
        };
        Ok(Self {
            src: src.ok_or_else(|| missing("src"))?,
            dst: dst.ok_or_else(|| missing("dst"))?,
            conf: conf.ok_or_else(|| missing("conf"))?,
            log,
        })
    }
}

/// One `executor` line of a pipeline config.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEntry {
    pub config: PathBuf,
    /// 1-based indices of the stages this one feeds.
    pub consumers: Vec<usize>,
}

/// The ordered stage list of a pipeline config.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub stages: Vec<StageEntry>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?, path)
    }

    pub fn parse(text: &str, file: &Path) -> Result<Self, ConfigError> {
        let mut stages = Vec::new();

        for (line, raw, words) in lines(text) {
            let entry = match words[0] {
                "executor" if words.len() >= 2 => words[2..]
                    .iter()
                    .map(|word| number::<usize>(word))
                    .collect::<Result<_, _>>()
                    .map(|consumers| StageEntry {
                        config: PathBuf::from(words[1]),
                        consumers,
                    }),
                "executor" => Err(LineError::Arity {
                    directive: "executor".to_string(),
                    expected: 1,
                    found: 0,
                }),
                other => Err(LineError::UnknownDirective(other.to_string())),
            };
            stages.push(entry.map_err(|e| line_error(file, line, raw, e))?);
        }

        Ok(Self { stages })
    }

    /// The consumer lists of every stage, in declaration order.
    pub fn wiring(&self) -> Vec<Vec<usize>> {
        self.stages.iter().map(|s| s.consumers.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TableMethod {
    Read,
    Write,
}

#[derive(Debug)]
enum Directive<'a> {
    Num(NonZeroUsize),
    Len(usize),
    Block(NonZeroUsize),
    Target(Direction),
    Prob(Symbol, f64),
    Table(&'a str),
    TableMethod(TableMethod),
}

impl<'a> Directive<'a> {
    fn parse(words: &[&'a str]) -> Result<Self, LineError> {
        let name = words[0];
        if name == "prob" {
            arity(words, 2)?;
            let probability: f64 = number(words[2])?;
            if !(probability > 0.0 && probability <= 1.0) {
                return Err(LineError::InvalidProbability(probability));
            }
            return Ok(Directive::Prob(symbol(words[1])?, probability));
        }

        let known = ["num", "len", "block", "target", "table", "table_method"];
        if !known.contains(&name) {
            return Err(LineError::UnknownDirective(name.to_string()));
        }
        arity(words, 1)?;
        let value = words[1];

        Ok(match name {
            "num" => Directive::Num(number(value)?),
            "len" => Directive::Len(number(value)?),
            "block" => Directive::Block(number(value)?),
            "target" => Directive::Target(match value {
                "encode" => Direction::Encode,
                "decode" => Direction::Decode,
                _ => return Err(LineError::UnknownTarget(value.to_string())),
            }),
            "table" => Directive::Table(value),
            _ => Directive::TableMethod(match value {
                "read" => TableMethod::Read,
                "write" => TableMethod::Write,
                _ => return Err(LineError::UnknownTableMethod(value.to_string())),
            }),
        })
    }
}

/// A directive failed either on its own line or in a file it refers to.
enum Failure {
    Line(LineError),
    File(ConfigError),
}

impl From<LineError> for Failure {
    fn from(e: LineError) -> Self {
        Failure::Line(e)
    }
}

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        Failure::File(e)
    }
}

/// Settings collected while a stage config is being read.
#[derive(Debug, Default)]
struct Draft {
    direction: Option<Direction>,
    run_length: Option<NonZeroUsize>,
    block_size: Option<NonZeroUsize>,
    text_len: Option<usize>,
    probabilities: BTreeMap<Symbol, f64>,
    table_path: Option<PathBuf>,
    /// Set by `table_method write`, cleared by a later `table_method read`.
    table_write: Option<TableWrite>,
}

impl Draft {
    /// Apply the `num` and `prob` lines of a table file.
    fn apply_table(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = read(path)?;
        for (line, raw, words) in lines(&text) {
            match Directive::parse(&words) {
                Ok(Directive::Num(n)) => self.run_length = Some(n),
                Ok(Directive::Prob(s, p)) => {
                    self.probabilities.insert(s, p);
                }
                Ok(_) => {
                    let reason = LineError::NotInTable(words[0].to_string());
                    return Err(line_error(path, line, raw, reason));
                }
                Err(reason) => return Err(line_error(path, line, raw, reason)),
            }
        }
        Ok(())
    }

    fn apply(&mut self, directive: Directive<'_>) -> Result<(), Failure> {
        match directive {
            Directive::Num(n) => self.run_length = Some(n),
            Directive::Len(n) => self.text_len = Some(n),
            Directive::Block(n) => self.block_size = Some(n),
            Directive::Target(d) => self.direction = Some(d),
            Directive::Prob(s, p) => {
                self.probabilities.insert(s, p);
            }
            Directive::Table(path) => self.table_path = Some(PathBuf::from(path)),
            Directive::TableMethod(method) => {
                let path = self.table_path.clone().ok_or(LineError::MissingTablePath)?;
                match method {
                    TableMethod::Read => {
                        self.table_write = None;
                        self.apply_table(&path)?;
                    }
                    TableMethod::Write => {
                        let run_length = self.run_length.ok_or(LineError::MissingRunLength)?;
                        self.table_write = Some(TableWrite { path, run_length });
                    }
                }
            }
        }
        Ok(())
    }

    fn table(&self, file: &Path) -> Result<ProbabilityTable, ConfigError> {
        let run_length = self.run_length.ok_or_else(|| ConfigError::Missing {
            file: file.to_path_buf(),
            key: "num",
        })?;
        let table_error = |source| ConfigError::Table {
            file: file.to_path_buf(),
            source,
        };

        let mut table = ProbabilityTable::new(run_length);
        for (&symbol, &probability) in &self.probabilities {
            table.insert(symbol, probability).map_err(table_error)?;
        }
        table.validate().map_err(table_error)?;
        Ok(table)
    }
}

/// A table still to be counted from the pipeline input and saved.
#[derive(Debug, Clone, PartialEq)]
struct TableWrite {
    path: PathBuf,
    run_length: NonZeroUsize,
}

impl TableWrite {
    /// Count probabilities over `corpus` and persist them to the table file.
    /// Returns the table and the corpus length.
    fn run(&self, corpus: &Path) -> Result<(ProbabilityTable, usize), ConfigError> {
        let unreadable = |source| ConfigError::Unreadable {
            path: corpus.to_path_buf(),
            source,
        };
        let table = ProbabilityTable::from_corpus(corpus, self.run_length).map_err(unreadable)?;
        let text_len = fs::metadata(corpus).map_err(unreadable)?.len();

        table
            .write(&self.path)
            .map_err(|source| ConfigError::Unwritable {
                path: self.path.clone(),
                source,
            })?;
        Ok((table, text_len as usize))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TableSource {
    Ready(ProbabilityTable),
    Corpus(TableWrite),
}

/// Load a table file written by [`ProbabilityTable::write`].
pub fn read_table(path: &Path) -> Result<ProbabilityTable, ConfigError> {
    let mut draft = Draft::default();
    draft.apply_table(path)?;
    draft.table(path)
}

/// A parsed stage config whose table may still have to be counted from the
/// pipeline input. Nothing is written until [`StagePlan::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    file: PathBuf,
    direction: Direction,
    block_size: NonZeroUsize,
    text_len: Option<usize>,
    table: TableSource,
}

impl StagePlan {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?, path)
    }

    pub fn parse(text: &str, file: &Path) -> Result<Self, ConfigError> {
        let mut draft = Draft::default();

        for (line, raw, words) in lines(text) {
            let directive = Directive::parse(&words).map_err(|e| line_error(file, line, raw, e))?;
            draft.apply(directive).map_err(|e| match e {
                Failure::Line(reason) => line_error(file, line, raw, reason),
                Failure::File(e) => e,
            })?;
        }

        let missing = |key| ConfigError::Missing {
            file: file.to_path_buf(),
            key,
        };
        let direction = draft.direction.ok_or_else(|| missing("target"))?;
        let block_size = draft.block_size.ok_or_else(|| missing("block"))?;
        let table = match draft.table_write.take() {
            Some(write) => TableSource::Corpus(write),
            None => TableSource::Ready(draft.table(file)?),
        };

        Ok(Self {
            file: file.to_path_buf(),
            direction,
            block_size,
            text_len: draft.text_len,
            table,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Finish the config, counting and saving the table from `corpus` if the
    /// stage asked for that. A configured `len` wins over the corpus length.
    pub fn build(self, corpus: &Path) -> Result<StageConfig, ConfigError> {
        let (table, text_len) = match self.table {
            TableSource::Ready(table) => (table, self.text_len),
            TableSource::Corpus(write) => {
                let (table, corpus_len) = write.run(corpus)?;
                (table, self.text_len.or(Some(corpus_len)))
            }
        };

        log::info!("Configured {} stage from {}", self.direction, self.file.display());
        Ok(StageConfig {
            direction: self.direction,
            block_size: self.block_size,
            text_len,
            table,
        })
    }
}

/// Everything a stage needs to be built.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub direction: Direction,
    pub block_size: NonZeroUsize,
    /// Number of symbols the whole stream is known to hold, if any.
    pub text_len: Option<usize>,
    pub table: ProbabilityTable,
}

impl StageConfig {
    /// Load a stage config. `corpus` is the pipeline input, scanned when the
    /// config asks for its table to be written.
    pub fn load(path: &Path, corpus: &Path) -> Result<Self, ConfigError> {
        StagePlan::load(path)?.build(corpus)
    }

    pub fn parse(text: &str, file: &Path, corpus: &Path) -> Result<Self, ConfigError> {
        StagePlan::parse(text, file)?.build(corpus)
    }
}
