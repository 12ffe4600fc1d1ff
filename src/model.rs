use serde::Serialize;
use std::str::FromStr;

/// `Task.class_id` value meaning "every class".
pub const ALL_CLASSES: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StudentStatus {
    Active,
    Inactive,
    Suspended,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "Active",
            StudentStatus::Inactive => "Inactive",
            StudentStatus::Suspended => "Suspended",
        }
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(StudentStatus::Active),
            "Inactive" => Ok(StudentStatus::Inactive),
            "Suspended" => Ok(StudentStatus::Suspended),
            other => Err(format!("unknown student status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BehaviorKind {
    Praise,
    Warn,
}

impl BehaviorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BehaviorKind::Praise => "PRAISE",
            BehaviorKind::Warn => "WARN",
        }
    }
}

impl FromStr for BehaviorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRAISE" => Ok(BehaviorKind::Praise),
            "WARN" => Ok(BehaviorKind::Warn),
            other => Err(format!("unknown behavior type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESENT" => Ok(AttendanceStatus::Present),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            "LATE" => Ok(AttendanceStatus::Late),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub class_name: String,
    pub school_year: String,
    pub homeroom_teacher: String,
    pub level: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub full_name: String,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub status: StudentStatus,
    /// Running total maintained by behavior CRUD.
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// A class id, or [`ALL_CLASSES`].
    pub class_id: String,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub require_reply: bool,
    pub created_at: String,
    pub grade: Option<String>,
    pub unit: Option<String>,
    pub points: Option<f64>,
}

impl Task {
    pub fn is_global(&self) -> bool {
        self.class_id == ALL_CLASSES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReply {
    pub id: String,
    pub task_id: String,
    pub student_id: String,
    pub reply_text: String,
    pub submitted_at: String,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    pub id: String,
    pub student_id: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: BehaviorKind,
    /// Signed contribution; sign is supplied by the caller.
    pub points: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}
