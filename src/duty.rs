use chrono::{DateTime, Duration, Utc};

/// Minutes a task stays open once its window starts.
pub const TASK_WINDOW: i64 = 30;

/// Task window start marks, in minutes from the duty start.
pub const TASK1_MARK: i64 = 30;
pub const TASK2_MARK: i64 = 90;
pub const TASK3_MARK: i64 = 150;

/// Full shift length in minutes.
pub const DUTY_DURATION: i64 = 180;

/// A single duty shift with its three task windows.
///
/// A duty without a user is a zombie: it occupies a slot in the registry but
/// nobody is responsible for it. The debtee is a user who owed this shift
/// and had it taken over on their behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duty {
    pub id: i64,
    pub user_id: Option<i64>,
    pub debtee_id: Option<i64>,
    pub duty_start: DateTime<Utc>,
    pub task1_start: DateTime<Utc>,
    pub task2_start: DateTime<Utc>,
    pub task3_start: DateTime<Utc>,
    pub duty_end: DateTime<Utc>,
    pub task1_end: DateTime<Utc>,
    pub task2_end: DateTime<Utc>,
    pub task3_end: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
}

impl Duty {
    /// Derive a fresh duty from its start instant. All task marks follow
    /// from the module constants.
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        let task1_start = now + Duration::minutes(TASK1_MARK);
        let task2_start = now + Duration::minutes(TASK2_MARK);
        let task3_start = now + Duration::minutes(TASK3_MARK);
        let window = Duration::minutes(TASK_WINDOW);

        Self {
            id: 0,
            user_id: None,
            debtee_id: None,
            duty_start: now,
            task1_start,
            task2_start,
            task3_start,
            duty_end: now + Duration::minutes(DUTY_DURATION),
            task1_end: task1_start + window,
            task2_end: task2_start + window,
            task3_end: task3_start + window,
            last_active: Some(now),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.duty_end <= Utc::now()
    }

    /// Warp the duty end back to now, marking the duty finished.
    pub fn force_finish(&mut self) {
        if !self.is_finished() {
            self.update_duty_end(Utc::now());
        }
    }

    /// Move the duty end, dragging along any task end that would otherwise
    /// outlive the shift.
    pub fn update_duty_end(&mut self, duty_end: DateTime<Utc>) {
        if self.task1_end > duty_end {
            self.task1_end = duty_end;
        }
        if self.task2_end > duty_end {
            self.task2_end = duty_end;
        }
        if self.task3_end > duty_end {
            self.task3_end = duty_end;
        }
        self.duty_end = duty_end;
    }

    /// The three task windows in order.
    pub fn task_windows(&self) -> [(DateTime<Utc>, DateTime<Utc>); 3] {
        [
            (self.task1_start, self.task1_end),
            (self.task2_start, self.task2_end),
            (self.task3_start, self.task3_end),
        ]
    }

    /// Human description used in API messages and logs.
    pub fn describe(&self, user_name: Option<&str>) -> String {
        let span = format!(
            "|{}| to |{}|",
            self.duty_start.format("%d %b %Y, %H:%M:%S"),
            self.duty_end.format("%d %b %Y, %H:%M:%S")
        );

        match user_name {
            None => format!("Zombie duty instance from time {}", span),
            Some(name) if self.is_finished() => {
                format!("Past duty instance from time {} by {}", span, name)
            }
            Some(name) => format!("Active duty instance from time {} by {}", span, name),
        }
    }
}
