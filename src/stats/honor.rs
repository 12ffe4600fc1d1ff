use super::badges::{evaluate_badges, Badge, BadgeInputs, BADGE_RULES, PODIUM_SIZE};
use super::behavior::aggregate_behavior;
use super::completion::{resolve_completion, TaskScope};
use super::ranking::{badge_leaders, top_student_ids};
use crate::model::Student;
use crate::snapshot::Snapshot;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub student: Student,
    pub class_name: String,
    pub points: i64,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub progress_percent: u32,
    pub badges: Vec<Badge>,
}

/// Stats for every student in roster order.
///
/// The points podium is taken from the whole population before any class
/// filter, so `VocabWarrior` is a school-wide badge.
pub fn build_student_stats(snapshot: &Snapshot) -> Vec<StudentStats> {
    let podium = top_student_ids(&snapshot.students, PODIUM_SIZE);

    snapshot
        .students
        .iter()
        .map(|s| {
            let class_name = snapshot
                .class(&s.class_id)
                .map(|c| c.class_name.clone())
                .unwrap_or_default();
            let completion =
                resolve_completion(&snapshot.tasks, &snapshot.replies, s, TaskScope::ClassOnly);
            let behavior = aggregate_behavior(&snapshot.behaviors, &s.id);

            let badges = evaluate_badges(
                &BadgeInputs {
                    student_id: &s.id,
                    points: s.points,
                    completed_tasks: completion.completed,
                    praise_count: behavior.praise_count,
                    warn_count: behavior.warn_count,
                },
                &podium,
            );

            StudentStats {
                student: s.clone(),
                class_name,
                points: s.points,
                total_tasks: completion.total(),
                completed_tasks: completion.completed,
                progress_percent: completion.progress_percent(),
                badges,
            }
        })
        .collect()
}

pub fn filter_by_class(stats: Vec<StudentStats>, class_id: Option<&str>) -> Vec<StudentStats> {
    match class_id {
        None | Some("all") => stats,
        Some(cid) => stats
            .into_iter()
            .filter(|s| s.student.class_id == cid)
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardWinner {
    pub student_id: String,
    pub full_name: String,
    pub class_name: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSection {
    pub badge: Badge,
    pub label: &'static str,
    pub description: &'static str,
    pub winners: Vec<BoardWinner>,
}

/// One section per badge in display order, each with up to three winners.
pub fn honor_board(stats: &[StudentStats]) -> Vec<BoardSection> {
    BADGE_RULES
        .iter()
        .map(|rule| BoardSection {
            badge: rule.badge,
            label: rule.badge.label(),
            description: rule.badge.description(),
            winners: badge_leaders(stats, rule.badge)
                .into_iter()
                .map(|s| BoardWinner {
                    student_id: s.student.id.clone(),
                    full_name: s.student.full_name.clone(),
                    class_name: s.class_name.clone(),
                    points: s.points,
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Behavior, BehaviorKind, ClassInfo, StudentStatus, Task, TaskReply};

    fn class(id: &str, name: &str) -> ClassInfo {
        ClassInfo {
            id: id.into(),
            class_name: name.into(),
            school_year: "2024-2025".into(),
            homeroom_teacher: "Ms. Hien".into(),
            level: None,
            note: None,
        }
    }

    fn student(id: &str, class_id: &str, points: i64) -> Student {
        Student {
            id: id.into(),
            class_id: class_id.into(),
            full_name: format!("Student {id}"),
            dob: None,
            gender: None,
            status: StudentStatus::Active,
            points,
        }
    }

    fn task(id: &str, class_id: &str) -> Task {
        Task {
            id: id.into(),
            class_id: class_id.into(),
            title: id.into(),
            description: String::new(),
            due_date: "2024-05-10".into(),
            require_reply: true,
            created_at: "2024-05-01T00:00:00Z".into(),
            grade: None,
            unit: None,
            points: Some(10.0),
        }
    }

    fn reply(task_id: &str, student_id: &str) -> TaskReply {
        TaskReply {
            id: format!("r-{task_id}-{student_id}"),
            task_id: task_id.into(),
            student_id: student_id.into(),
            reply_text: String::new(),
            submitted_at: "2024-05-03T09:00:00Z".into(),
            grade: None,
            feedback: None,
        }
    }

    fn behavior(student_id: &str, kind: BehaviorKind, points: i64) -> Behavior {
        Behavior {
            id: format!("b-{student_id}-{points}"),
            student_id: student_id.into(),
            date: "2024-05-06".into(),
            kind,
            points,
            content: String::new(),
        }
    }

    fn sample() -> Snapshot {
        Snapshot {
            classes: vec![class("c1", "5A"), class("c2", "4B")],
            students: vec![
                student("s1", "c1", 20),
                student("s2", "c1", 20),
                student("s3", "c2", 15),
                student("s4", "c2", 10),
            ],
            tasks: vec![task("t1", "c1"), task("t2", "all"), task("t3", "c2")],
            replies: vec![reply("t1", "s1"), reply("t1", "s1"), reply("t3", "s3")],
            behaviors: vec![
                behavior("s2", BehaviorKind::Warn, 0),
                behavior("s3", BehaviorKind::Praise, 2),
                behavior("s3", BehaviorKind::Praise, 2),
                behavior("s3", BehaviorKind::Praise, 2),
            ],
            attendance: vec![],
        }
    }

    fn find<'a>(stats: &'a [StudentStats], id: &str) -> &'a StudentStats {
        stats
            .iter()
            .find(|s| s.student.id == id)
            .expect("student stats")
    }

    #[test]
    fn stats_cover_every_student_with_progress() {
        let stats = build_student_stats(&sample());
        assert_eq!(stats.len(), 4);

        let s1 = find(&stats, "s1");
        assert_eq!(s1.class_name, "5A");
        assert_eq!((s1.total_tasks, s1.completed_tasks, s1.progress_percent), (2, 1, 50));

        for s in &stats {
            assert!(s.completed_tasks <= s.total_tasks);
            if s.total_tasks == 0 {
                assert_eq!(s.progress_percent, 0);
            }
        }
    }

    #[test]
    fn podium_is_global_and_stable() {
        let stats = build_student_stats(&sample());
        let warriors: Vec<&str> = stats
            .iter()
            .filter(|s| s.badges.contains(&Badge::VocabWarrior))
            .map(|s| s.student.id.as_str())
            .collect();
        assert_eq!(warriors, ["s1", "s2", "s3"]);

        // Filtering a class afterwards does not recompute the podium.
        let c2 = filter_by_class(stats, Some("c2"));
        assert_eq!(c2.len(), 2);
        assert!(find(&c2, "s3").badges.contains(&Badge::VocabWarrior));
        assert!(!find(&c2, "s4").badges.contains(&Badge::VocabWarrior));
    }

    #[test]
    fn badges_reflect_behavior_and_completion() {
        let stats = build_student_stats(&sample());

        let s1 = find(&stats, "s1");
        assert!(s1.badges.contains(&Badge::PerfectAttendance));
        assert!(s1.badges.contains(&Badge::DigitalCitizen));
        assert!(s1.badges.contains(&Badge::DigitalResearcher));

        let s2 = find(&stats, "s2");
        assert!(!s2.badges.contains(&Badge::PerfectAttendance));
        assert!(!s2.badges.contains(&Badge::DigitalCitizen));

        let s3 = find(&stats, "s3");
        assert!(s3.badges.contains(&Badge::Communicator));
        assert!(!s3.badges.contains(&Badge::CivilityAmbassador));
        assert!(!s3.badges.contains(&Badge::DigitalResearcher));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let snap = sample();
        assert_eq!(build_student_stats(&snap), build_student_stats(&snap));
    }

    #[test]
    fn board_lists_every_badge_in_display_order() {
        let stats = build_student_stats(&sample());
        let board = honor_board(&stats);
        assert_eq!(board.len(), BADGE_RULES.len());
        assert_eq!(board[0].badge, Badge::LanguageExpert);
        assert!(board[0].winners.is_empty());

        let perfect = board
            .iter()
            .find(|s| s.badge == Badge::PerfectAttendance)
            .expect("section");
        let ids: Vec<&str> = perfect.winners.iter().map(|w| w.student_id.as_str()).collect();
        assert_eq!(ids, ["s1", "s3", "s4"]);
    }

    #[test]
    fn empty_snapshot_gives_empty_stats() {
        let stats = build_student_stats(&Snapshot::default());
        assert!(stats.is_empty());
        assert!(honor_board(&stats).iter().all(|s| s.winners.is_empty()));
    }
}
