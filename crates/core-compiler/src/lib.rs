//! The JIT compiler: statements → blocks, one group at a time.
//!
//! Compilation is lazy. `compile` builds exactly one block for a lap group;
//! children stay as statement ids inside the block's child runner and come
//! back through here (`Action::PushStatements`) when the runner needs them
//! on the stack. Strategy selection is an ordered first-match-wins scan over
//! registered trait objects.
//!
//! Unmatchable or unresolvable statements are reported as `CompileError`;
//! the runtime records the error, drops the group, and keeps going.

use core_blocks::{BlockBuilder, BlockKind, BuildError, CompileContext, ContainerSpec, RuntimeBlock};
use core_script::{CodeStatement, StatementId, StatementTable};
use core_state::KeySource;

mod fragments;
mod strategies;

pub use fragments::compile_display;
pub use strategies::{
    EffortStrategy, GroupStrategy, IntervalStrategy, RoundsStrategy, TimeBoundRoundsStrategy,
    TimerStrategy,
};

/// Mutable compile-time services: the statement table and the runtime's key
/// allocator.
pub struct CompilerEnv<'a> {
    pub table: &'a StatementTable,
    pub keys: &'a mut KeySource,
}

/// Predicate + constructor pair. Registered in precedence order; the first
/// `matches` wins.
pub trait CompileStrategy: Send {
    fn name(&self) -> &'static str;

    fn matches(&self, statements: &[&CodeStatement], ctx: &CompileContext) -> bool;

    fn compile(
        &self,
        statements: &[&CodeStatement],
        env: &mut CompilerEnv<'_>,
        ctx: &CompileContext,
    ) -> anyhow::Result<RuntimeBlock>;
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("no statements resolve from {ids:?}")]
    MissingStatements { ids: Vec<StatementId> },
    #[error("no strategy matches statements {ids:?}")]
    NoStrategy { ids: Vec<StatementId> },
    #[error("script has no top-level statements")]
    EmptyScript,
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("strategy {strategy} failed for {ids:?}: {source:#}")]
    Strategy {
        strategy: &'static str,
        ids: Vec<StatementId>,
        #[source]
        source: anyhow::Error,
    },
}

pub struct JitCompiler {
    strategies: Vec<Box<dyn CompileStrategy>>,
}

impl Default for JitCompiler {
    fn default() -> Self {
        Self::with_default_strategies()
    }
}

impl JitCompiler {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The built-in precedence: timer-with-action shapes first, bare timer,
    /// rounds, group, then the effort fallback.
    pub fn with_default_strategies() -> Self {
        let mut compiler = Self::new();
        compiler.register(IntervalStrategy);
        compiler.register(TimeBoundRoundsStrategy);
        compiler.register(TimerStrategy);
        compiler.register(RoundsStrategy);
        compiler.register(GroupStrategy);
        compiler.register(EffortStrategy);
        compiler
    }

    pub fn register(&mut self, strategy: impl CompileStrategy + 'static) {
        self.strategies.push(Box::new(strategy));
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Compile one lap group.
    pub fn compile(
        &self,
        table: &StatementTable,
        keys: &mut KeySource,
        ids: &[StatementId],
        ctx: &CompileContext,
    ) -> Result<RuntimeBlock, CompileError> {
        let (statements, missing) = table.resolve(ids);
        if !missing.is_empty() {
            tracing::warn!(target: "compile.strategy", ?missing, "unresolvable statement ids");
        }
        if statements.is_empty() {
            return Err(CompileError::MissingStatements { ids: ids.to_vec() });
        }
        let mut env = CompilerEnv { table, keys };
        for strategy in &self.strategies {
            if !strategy.matches(&statements, ctx) {
                continue;
            }
            tracing::debug!(
                target: "compile.strategy",
                strategy = strategy.name(),
                ?ids,
                "strategy selected"
            );
            return strategy
                .compile(&statements, &mut env, ctx)
                .map_err(|source| CompileError::Strategy {
                    strategy: strategy.name(),
                    ids: ids.to_vec(),
                    source,
                });
        }
        Err(CompileError::NoStrategy { ids: ids.to_vec() })
    }

    /// Compile the workout root. A single top-level statement compiles
    /// directly; several top-level statements wrap into a synthetic group
    /// that runs them in order.
    pub fn compile_root(
        &self,
        table: &StatementTable,
        keys: &mut KeySource,
    ) -> Result<RuntimeBlock, CompileError> {
        let roots = table.roots();
        match roots.len() {
            0 => Err(CompileError::EmptyScript),
            1 => self.compile(
                table,
                keys,
                &[roots[0].id],
                &CompileContext::default(),
            ),
            _ => {
                let groups: Vec<Vec<StatementId>> =
                    roots.iter().map(|s| vec![s.id]).collect();
                let block = BlockBuilder::new(keys.fresh(), BlockKind::Group, "Workout")
                    .as_container(ContainerSpec {
                        groups,
                        rest_groups: Vec::new(),
                        inherited: CompileContext::default(),
                    })
                    .finish()?;
                Ok(block)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_script::{Fragment, FragmentKind, TimerDirection};

    fn table(statements: Vec<CodeStatement>) -> StatementTable {
        StatementTable::from_statements(statements).unwrap()
    }

    fn timer_statement(id: u32, duration_ms: Option<u64>) -> CodeStatement {
        let mut s = CodeStatement::new(id);
        s.fragments.push(Fragment::parser(FragmentKind::Timer {
            direction: TimerDirection::Up,
            duration_ms,
        }));
        s
    }

    fn effort_statement(id: u32, label: &str, parent: Option<u32>) -> CodeStatement {
        let mut s = CodeStatement::new(id);
        s.parent = parent.map(StatementId);
        s.fragments.push(Fragment::parser(FragmentKind::Effort {
            label: label.into(),
        }));
        s
    }

    #[test]
    fn timer_statement_selects_timer_strategy() {
        let table = table(vec![timer_statement(1, Some(10_000))]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let block = compiler
            .compile(&table, &mut keys, &[StatementId(1)], &CompileContext::default())
            .unwrap();
        assert_eq!(block.kind(), BlockKind::Timer);
    }

    #[test]
    fn rounds_with_children_selects_rounds_strategy() {
        let mut parent = CodeStatement::new(1);
        parent
            .fragments
            .push(Fragment::parser(FragmentKind::Rounds { count: 3 }));
        parent.children = vec![vec![StatementId(2)], vec![StatementId(3)]];
        let table = table(vec![
            parent,
            effort_statement(2, "Pushups", Some(1)),
            effort_statement(3, "Squats", Some(1)),
        ]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let block = compiler
            .compile(&table, &mut keys, &[StatementId(1)], &CompileContext::default())
            .unwrap();
        assert_eq!(block.kind(), BlockKind::Rounds);
    }

    #[test]
    fn rest_children_configure_the_rest_guard() {
        let mut parent = CodeStatement::new(1);
        parent
            .fragments
            .push(Fragment::parser(FragmentKind::Rounds { count: 2 }));
        parent.children = vec![vec![StatementId(2)], vec![StatementId(3)]];
        let work = effort_statement(2, "Row", Some(1));
        let mut rest = CodeStatement::new(3);
        rest.parent = Some(StatementId(1));
        rest.fragments.push(Fragment::parser(FragmentKind::Action {
            label: "Rest".into(),
            pinned: false,
        }));

        let table = table(vec![parent, work, rest]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let block = compiler
            .compile(&table, &mut keys, &[StatementId(1)], &CompileContext::default())
            .unwrap();
        assert!(block.behavior_names().contains(&"RestBlockGuard"));
    }

    #[test]
    fn timer_with_amrap_action_beats_plain_timer() {
        let mut s = timer_statement(1, Some(600_000));
        s.fragments.push(Fragment::parser(FragmentKind::Action {
            label: "AMRAP".into(),
            pinned: false,
        }));
        s.children = vec![vec![StatementId(2)]];
        let table = table(vec![s, effort_statement(2, "Burpees", Some(1))]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let block = compiler
            .compile(&table, &mut keys, &[StatementId(1)], &CompileContext::default())
            .unwrap();
        assert_eq!(block.kind(), BlockKind::TimeBoundRounds);
    }

    #[test]
    fn emom_selects_interval_strategy_ahead_of_amrap_shape() {
        let mut s = timer_statement(1, Some(60_000));
        s.fragments.push(Fragment::parser(FragmentKind::Action {
            label: "EMOM".into(),
            pinned: false,
        }));
        s.fragments
            .push(Fragment::parser(FragmentKind::Rounds { count: 10 }));
        s.children = vec![vec![StatementId(2)]];
        let table = table(vec![s, effort_statement(2, "Burpees", Some(1))]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let block = compiler
            .compile(&table, &mut keys, &[StatementId(1)], &CompileContext::default())
            .unwrap();
        assert_eq!(block.kind(), BlockKind::Interval);
    }

    #[test]
    fn bare_effort_falls_back_to_effort_strategy() {
        let table = table(vec![effort_statement(1, "Deadlift", None)]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let block = compiler
            .compile(&table, &mut keys, &[StatementId(1)], &CompileContext::default())
            .unwrap();
        assert_eq!(block.kind(), BlockKind::Effort);
        assert_eq!(block.label(), "Deadlift");
    }

    #[test]
    fn missing_ids_are_an_error_not_a_panic() {
        let table = table(vec![]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let err = compiler
            .compile(&table, &mut keys, &[StatementId(9)], &CompileContext::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingStatements { .. }));
    }

    #[test]
    fn multi_root_scripts_wrap_into_a_group() {
        let table = table(vec![
            effort_statement(1, "Row", None),
            effort_statement(2, "Run", None),
        ]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        let root = compiler.compile_root(&table, &mut keys).unwrap();
        assert_eq!(root.kind(), BlockKind::Group);
    }

    #[test]
    fn empty_script_is_a_compile_error() {
        let table = table(vec![]);
        let compiler = JitCompiler::default();
        let mut keys = KeySource::default();
        assert!(matches!(
            compiler.compile_root(&table, &mut keys),
            Err(CompileError::EmptyScript)
        ));
    }
}
