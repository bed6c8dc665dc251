use pretty_assertions::assert_eq;
use smallvec::smallvec;

use super::*;

fn resume(instance: usize) -> Action {
    Action::Resume(ResumeHandle {
        instance: InstanceId::new(instance),
        procedure: ProcIndex::new(1),
    })
}

#[test]
fn due_timers_come_out_in_submission_order() {
    let mut scheduler = TestScheduler::new(0.5);
    scheduler.submit(scheduler.after_seconds(1.0), resume(0));
    scheduler.submit(scheduler.after_frames(1), resume(1));
    scheduler.submit(scheduler.after_seconds(0.25), resume(2));
    assert_eq!(scheduler.take_due_timer(), None);

    scheduler.advance_frame();
    let fired: Vec<u64> = std::iter::from_fn(|| scheduler.take_due_timer())
        .map(|r| r.seq)
        .collect();
    assert_eq!(fired, vec![1, 2]);

    scheduler.advance_seconds(0.5);
    assert_eq!(scheduler.take_due_timer().map(|r| r.seq), Some(0));
    assert!(scheduler.is_empty());
}

#[test]
fn resubmitting_a_resume_replaces_it() {
    let mut scheduler = TestScheduler::new(0.5);
    scheduler.submit(scheduler.after_seconds(5.0), resume(0));
    scheduler.submit(scheduler.after_seconds(1.0), resume(1));
    scheduler.submit(scheduler.after_frames(1), resume(0));

    let pending: Vec<(u64, &Due)> = scheduler.pending().iter().map(|r| (r.seq, &r.due)).collect();
    assert_eq!(pending, vec![(1, &Due::Seconds(1.0)), (2, &Due::Frame(1))]);
}

#[test]
fn frame_delays_are_at_least_one_frame() {
    let scheduler = TestScheduler::new(0.5);
    assert_eq!(scheduler.after_frames(0), Due::Frame(1));
    assert_eq!(scheduler.after_frames(-3), Due::Frame(1));
    assert_eq!(scheduler.after_frames(4), Due::Frame(4));
    assert_eq!(scheduler.after_seconds(-1.0), Due::Seconds(0.0));
}

#[test]
fn completion_requests_wait_for_their_tasks() {
    let mut scheduler = TestScheduler::new(0.5);
    let a = TaskId::new(0);
    let b = TaskId::new(1);
    scheduler.submit(
        Due::Completion {
            tasks: smallvec![a, b],
            mode: JoinMode::All,
        },
        resume(0),
    );
    assert!(!scheduler.has_timers());
    assert_eq!(scheduler.take_due_timer(), None);

    let only_a = |tasks: &[TaskId], mode: JoinMode| match mode {
        JoinMode::All => tasks.iter().all(|&t| t == a),
        JoinMode::Any => tasks.contains(&a),
    };
    assert_eq!(scheduler.take_ready_completion(only_a), None);
    assert!(scheduler.take_ready_completion(|_, _| true).is_some());
}

#[test]
fn taking_by_seq_moves_the_clock() {
    let mut scheduler = TestScheduler::new(0.5);
    scheduler.submit(scheduler.after_frames(3), resume(0));
    scheduler.submit(scheduler.after_seconds(10.0), resume(1));

    assert_eq!(scheduler.timer_seqs(), vec![0, 1]);
    assert!(scheduler.take_seq(0).is_some());
    assert_eq!(scheduler.frame(), 3);
    assert_eq!(scheduler.now(), 1.5);

    assert!(scheduler.take_seq(1).is_some());
    assert_eq!(scheduler.now(), 10.0);
    assert_eq!(scheduler.take_seq(1), None);
}
