//! Lifecycle tests for generations driven end to end against a real git
//! repository with a scripted agent.
//!
//! These exercise the generator through start → run → failure → resume →
//! switch → stop → reset and check the state derived from git after each
//! step.

use std::fs;
use std::path::Path;
use std::process::Command;

use orchestrator::core::generation::{GenerationState, SuspendReason};
use orchestrator::error::OrchestratorError;
use orchestrator::generator::{Generator, ResumeOutcome};
use orchestrator::io::agent::AgentPhase;
use orchestrator::io::config::OrchestratorConfig;
use orchestrator::test_support::{ScriptedAgent, Step, TestRepo, task, task_list};

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {}", args.join(" "));
}

fn one_task_cycle(id: &str, file: &str) -> Vec<Step> {
    vec![
        Step::WriteTasks(task_list(vec![task(id, &format!("Implement {id}"))])),
        Step::WriteFile {
            path: file.to_string(),
            body: format!("// {id}\n"),
        },
    ]
}

#[test]
fn generation_runs_suspends_resumes_and_merges() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, one_task_cycle("t1", "src/one.rs"));
    let generator = Generator::new(repo.path(), &config, &agent);

    let name = generator.start().expect("start");
    assert!(name.starts_with("generation-"));
    assert_eq!(generator.current().expect("current").as_deref(), Some(name.as_str()));
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Active { cycle: 0 }
    );
    let worktree = generator.worktree_path(&name);
    assert!(worktree.join(".cobbler/.gitignore").exists());
    assert!(!repo.git().is_dirty().expect("root status"));

    // Cycle 1: one task measured, one stitched, committed.
    let reports = generator.run(1).expect("run");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].cycle, 1);
    assert_eq!(reports[0].tasks_proposed, 1);
    assert_eq!(reports[0].tasks_completed, vec!["t1".to_string()]);
    assert_eq!(reports[0].diffstat.files_changed, 1);
    assert_eq!(agent.phases(), vec![AgentPhase::Measure, AgentPhase::Stitch]);
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Active { cycle: 1 }
    );
    let tip = repo.git().last_commit(&name).expect("tip");
    assert!(tip.message.contains("- t1: Implement t1"));
    assert!(tip.message.contains("Generation-Cycle: 1"));
    assert!(worktree.join(".cobbler/cycles/1/meta.json").exists());

    // Cycle 2: measure leaves a stray file but no task list. The stray file is
    // dropped and the generation suspends at the last committed cycle.
    agent.push([Step::WriteFile {
        path: "partial.txt".to_string(),
        body: "half done\n".to_string(),
    }]);
    let err = generator.run(1).expect_err("cycle should fail");
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::CycleSuspended { cycle, .. }) => assert_eq!(*cycle, 1),
        other => panic!("expected CycleSuspended, got {other:?}"),
    }
    assert!(format!("{err:#}").contains("measure agent task list"));
    assert!(!worktree.join("partial.txt").exists());
    assert!(worktree.join(".cobbler/cycles/2/meta.json").exists());
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Suspended {
            cycle: 1,
            reason: SuspendReason::Recorded
        }
    );

    // `run` refuses a suspended generation.
    let err = generator.run(1).expect_err("run on suspended");
    assert!(matches!(
        err.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::InvalidState { .. })
    ));

    // Resume without a name picks the current generation and runs cycle 2.
    agent.push(one_task_cycle("t2", "src/two.rs"));
    match generator.resume(None, 1).expect("resume") {
        ResumeOutcome::Resumed { name: resumed, from, cycles } => {
            assert_eq!(resumed, name);
            assert!(matches!(from, GenerationState::Suspended { cycle: 1, .. }));
            assert_eq!(cycles.len(), 1);
            assert_eq!(cycles[0].cycle, 2);
        }
        other => panic!("expected Resumed, got {other:?}"),
    }
    assert_eq!(agent.remaining(), 0);

    // Resuming an active generation is a no-op.
    match generator.resume(None, 1).expect("resume active") {
        ResumeOutcome::AlreadyActive { cycle, .. } => assert_eq!(cycle, 2),
        other => panic!("expected AlreadyActive, got {other:?}"),
    }

    let stopped = generator.stop(None).expect("stop");
    assert_eq!(stopped.name, name);
    assert_eq!(stopped.cycle, 2);
    assert_eq!(stopped.base_branch, "main");
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Merged { cycle: 2 }
    );
    assert!(repo.path().join("src/one.rs").exists());
    assert!(repo.path().join("src/two.rs").exists());
    assert!(!worktree.exists());
    assert_eq!(generator.current().expect("current"), None);
    assert!(repo.git().branch_exists(&name).expect("branch kept"));

    // A merged generation cannot be resumed.
    let err = generator.resume(Some(&name), 1).expect_err("resume merged");
    assert!(matches!(
        err.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::InvalidState { .. })
    ));
}

#[test]
fn switching_checkpoints_the_previous_generation() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, Vec::new());
    let generator = Generator::new(repo.path(), &config, &agent);

    let first = generator.start().expect("start first");
    fs::write(generator.worktree_path(&first).join("wip.txt"), "wip\n").expect("wip");
    let second = generator.start().expect("start second");
    assert_ne!(first, second);
    assert_eq!(generator.current().expect("current").as_deref(), Some(second.as_str()));

    // Starting the second generation committed the first one's work as suspended.
    assert_eq!(
        generator.state_of(&first).expect("state"),
        GenerationState::Suspended {
            cycle: 0,
            reason: SuspendReason::Recorded
        }
    );
    let tip = repo.git().last_commit(&first).expect("tip");
    assert!(tip.message.contains("Generation-State: suspended"));

    let state = generator.switch(&first).expect("switch");
    assert!(matches!(state, GenerationState::Suspended { cycle: 0, .. }));
    assert_eq!(generator.current().expect("current").as_deref(), Some(first.as_str()));
    assert!(matches!(
        generator.state_of(&second).expect("state"),
        GenerationState::Suspended { .. }
    ));

    let rows = generator.list().expect("list");
    let names: Vec<&str> = rows.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, vec![first.as_str(), second.as_str()]);
    assert!(rows[0].is_current);
    assert!(!rows[1].is_current);
    assert!(rows.iter().all(|row| row.worktree.is_some()));

    let err = generator.switch("generation-19990101.0").expect_err("unknown");
    assert!(matches!(
        err.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::NoRecoverableState(_))
    ));
}

#[test]
fn resume_recreates_a_missing_worktree() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, Vec::new());
    let generator = Generator::new(repo.path(), &config, &agent);

    let name = generator.start().expect("start");
    let worktree = generator.worktree_path(&name);
    fs::remove_dir_all(&worktree).expect("remove worktree");
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Suspended {
            cycle: 0,
            reason: SuspendReason::WorktreeMissing
        }
    );

    match generator.resume(Some(&name), 0).expect("resume") {
        ResumeOutcome::Resumed { cycles, .. } => assert!(cycles.is_empty()),
        other => panic!("expected Resumed, got {other:?}"),
    }
    assert!(worktree.join(".git").exists());
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Active { cycle: 0 }
    );
}

#[test]
fn reset_removes_unmerged_generations_only() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, Vec::new());
    let generator = Generator::new(repo.path(), &config, &agent);

    let merged = generator.start().expect("start merged");
    generator.stop(None).expect("stop");
    let open = generator.start().expect("start open");

    let removed = generator.reset(None, false).expect("reset");
    assert_eq!(removed, vec![open.clone()]);
    assert!(!repo.git().branch_exists(&open).expect("branch"));
    assert!(!generator.worktree_path(&open).exists());
    assert_eq!(generator.current().expect("current"), None);
    assert_eq!(generator.names().expect("names"), vec![merged.clone()]);

    let err = generator.reset(Some(&merged), false).expect_err("merged needs force");
    assert!(matches!(
        err.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::InvalidState { .. })
    ));
    assert_eq!(
        generator.reset(Some(&merged), true).expect("forced"),
        vec![merged]
    );
    assert!(generator.names().expect("names").is_empty());
}

#[test]
fn resume_without_candidates_reports_no_recoverable_state() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, Vec::new());
    let generator = Generator::new(repo.path(), &config, &agent);

    let err = generator.resume(None, 1).expect_err("nothing to resume");
    assert!(matches!(
        err.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::NoRecoverableState(_))
    ));
}

#[test]
fn leaving_a_suspended_generation_commits_its_worktree_changes() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, vec![Step::Fail("agent crashed".into())]);
    let generator = Generator::new(repo.path(), &config, &agent);

    let first = generator.start().expect("start first");
    generator.run(1).expect_err("cycle should fail");
    assert_eq!(
        generator.state_of(&first).expect("state"),
        GenerationState::Suspended {
            cycle: 0,
            reason: SuspendReason::Recorded
        }
    );

    // Manual edits in a recorded-suspended worktree survive leaving it.
    let worktree = generator.worktree_path(&first);
    fs::write(worktree.join("manual.txt"), "keep me\n").expect("manual edit");
    let second = generator.start().expect("start second");
    assert!(!repo.git().at(&worktree).is_dirty().expect("status"));
    assert!(matches!(
        generator.state_of(&first).expect("state"),
        GenerationState::Suspended { cycle: 0, .. }
    ));

    generator.switch(&first).expect("switch back");
    assert!(matches!(
        generator.state_of(&second).expect("state"),
        GenerationState::Suspended { cycle: 0, .. }
    ));
    generator.resume(Some(&first), 0).expect("resume");
    assert!(worktree.join("manual.txt").exists());
    assert_eq!(
        generator.state_of(&first).expect("state"),
        GenerationState::Active { cycle: 0 }
    );
}

#[test]
fn switch_fails_and_keeps_current_when_checkpoint_cannot_commit() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, Vec::new());
    let generator = Generator::new(repo.path(), &config, &agent);

    let first = generator.start().expect("start first");
    let second = generator.start().expect("start second");
    let lock = repo
        .path()
        .join(".git/worktrees")
        .join(&second)
        .join("index.lock");
    fs::write(&lock, "").expect("lock index");

    generator.switch(&first).expect_err("checkpoint commit must fail");
    assert_eq!(generator.current().expect("current").as_deref(), Some(second.as_str()));

    fs::remove_file(&lock).expect("unlock index");
    generator.switch(&first).expect("switch");
    assert_eq!(generator.current().expect("current").as_deref(), Some(first.as_str()));
}

#[test]
fn switch_leaves_current_untouched_when_target_worktree_cannot_be_created() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, Vec::new());
    let generator = Generator::new(repo.path(), &config, &agent);

    let first = generator.start().expect("start first");
    let second = generator.start().expect("start second");
    fs::remove_dir_all(generator.worktree_path(&first)).expect("remove worktree");
    git(repo.path(), &["worktree", "prune"]);
    let elsewhere = repo.path().join(".worktrees").join("elsewhere");
    let elsewhere_arg = elsewhere.to_string_lossy().to_string();
    git(repo.path(), &["worktree", "add", "--quiet", &elsewhere_arg, &first]);

    generator.switch(&first).expect_err("branch is checked out elsewhere");
    assert_eq!(generator.current().expect("current").as_deref(), Some(second.as_str()));
    assert_eq!(
        generator.state_of(&second).expect("state"),
        GenerationState::Active { cycle: 0 }
    );

    git(repo.path(), &["worktree", "remove", "--force", &elsewhere_arg]);
    generator.switch(&first).expect("switch");
    assert_eq!(generator.current().expect("current").as_deref(), Some(first.as_str()));
    assert!(generator.worktree_present(&first));
}

#[test]
fn resume_recovers_an_interrupted_generation() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, one_task_cycle("t1", "src/one.rs"));
    let generator = Generator::new(repo.path(), &config, &agent);

    let name = generator.start().expect("start");
    let worktree = generator.worktree_path(&name);
    fs::write(worktree.join("half.txt"), "crashed mid-cycle\n").expect("partial");
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Suspended {
            cycle: 0,
            reason: SuspendReason::Interrupted
        }
    );

    match generator.resume(None, 1).expect("resume") {
        ResumeOutcome::Resumed { from, cycles, .. } => {
            assert_eq!(
                from,
                GenerationState::Suspended {
                    cycle: 0,
                    reason: SuspendReason::Interrupted
                }
            );
            assert_eq!(cycles.len(), 1);
            assert_eq!(cycles[0].cycle, 1);
        }
        other => panic!("expected Resumed, got {other:?}"),
    }
    assert!(!worktree.join("half.txt").exists());
    assert!(worktree.join("src/one.rs").exists());
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Active { cycle: 1 }
    );
}

#[test]
fn run_advances_the_counter_once_per_cycle() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let mut steps = one_task_cycle("t1", "src/one.rs");
    steps.extend(one_task_cycle("t2", "src/two.rs"));
    steps.extend(one_task_cycle("t3", "src/three.rs"));
    let agent = ScriptedAgent::new(&config.scratch_dir, steps);
    let generator = Generator::new(repo.path(), &config, &agent);

    let name = generator.start().expect("start");
    let reports = generator.run(3).expect("run");
    let cycles: Vec<u32> = reports.iter().map(|r| r.cycle).collect();
    assert_eq!(cycles, vec![1, 2, 3]);
    assert_eq!(agent.remaining(), 0);
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Active { cycle: 3 }
    );
    let tip = repo.git().last_commit(&name).expect("tip");
    assert!(tip.message.contains("Generation-Cycle: 3"));
}

#[test]
fn stop_with_merge_conflict_leaves_generation_completing() {
    let repo = TestRepo::new().expect("repo");
    let config = OrchestratorConfig::default();
    let agent = ScriptedAgent::new(&config.scratch_dir, one_task_cycle("t1", "README.md"));
    let generator = Generator::new(repo.path(), &config, &agent);

    let name = generator.start().expect("start");
    generator.run(1).expect("run");

    // Diverge the base branch on the same file.
    repo.write("README.md", "# changed on main\n").expect("edit");
    repo.git().add_all().expect("add");
    repo.git().commit("edit readme", false).expect("commit");

    let err = generator.stop(None).expect_err("merge conflict");
    assert!(format!("{err:#}").contains("generation left completing"));
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Completing { cycle: 1 }
    );
    assert!(!repo.git().is_dirty().expect("merge aborted"));
    assert!(generator.worktree_present(&name));
    assert_eq!(generator.current().expect("current").as_deref(), Some(name.as_str()));

    match generator.resume(None, 0).expect("resume") {
        ResumeOutcome::Resumed { from, .. } => {
            assert_eq!(from, GenerationState::Completing { cycle: 1 });
        }
        other => panic!("expected Resumed, got {other:?}"),
    }
    assert_eq!(
        generator.state_of(&name).expect("state"),
        GenerationState::Active { cycle: 1 }
    );
}
