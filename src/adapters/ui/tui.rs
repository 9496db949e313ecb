//! Implements InputPort. Inquire-based interactive prompts.
//!
//! Sign-in by phone code, then a role-specific menu loop. A failed action prints its
//! user message and returns to the menu; only prompt failures end the session.

use crate::domain::access::can_manage_course;
use crate::domain::{
    Account, AttendanceStatus, CodePurpose, Course, DomainError, EnrollmentDraft, ExerciseStatus,
    Lesson, NewCourse, NewExercise, NewLesson, NewStudent, NewSubscription, Role, Student,
};
use crate::ports::{Clock, InputPort};
use crate::usecases::lesson_service::{AttendanceUpdate, ResultUpdate};
use crate::usecases::roster_service::{CourseDetail, StudentDetail};
use crate::usecases::{
    AuthService, BillingService, Dashboard, DashboardService, EnrollmentService, LessonService,
    LessonSheet, LessonSheetUpdate, RosterService, ScheduleService,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use inquire::ui::{Color, RenderConfig, StyleSheet, Styled};
use inquire::{Confirm, InquireError, MultiSelect, Select, Text};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Applies the prompt theme globally. Call once before the first prompt.
pub fn apply_theme() {
    let mut config = RenderConfig::default();
    config.prompt_prefix = Styled::new("›").with_fg(Color::LightGreen);
    config.highlighted_option_prefix = Styled::new("➤").with_fg(Color::LightYellow);
    config.answer = StyleSheet::new().with_fg(Color::LightGreen);
    inquire::set_global_render_config(config);
}

/// Select option carrying a value next to its label.
#[derive(Clone)]
struct Choice<T> {
    label: String,
    value: T,
}

impl<T> Choice<T> {
    fn new(label: impl Into<String>, value: T) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

impl<T> fmt::Display for Choice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Dashboard,
    StudentCard,
    CourseCard,
    CreateStudent,
    CreateCourse,
    Enroll,
    EndEnrollment,
    LinkGuardian,
    Subscribe,
    GrantRole,
    DeleteCourse,
    CreateLesson,
    GenerateLessons,
    LessonSheet,
    AddExercise,
    SignOut,
    Quit,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Self::Dashboard => "Сводка",
            Self::StudentCard => "Карточка ученика",
            Self::CourseCard => "Карточка курса",
            Self::CreateStudent => "Новый ученик",
            Self::CreateCourse => "Новый курс",
            Self::Enroll => "Записать на курс",
            Self::EndEnrollment => "Завершить запись",
            Self::LinkGuardian => "Привязать родителя",
            Self::Subscribe => "Оформить абонемент",
            Self::GrantRole => "Выдать роль",
            Self::DeleteCourse => "Удалить курс",
            Self::CreateLesson => "Новое занятие",
            Self::GenerateLessons => "Сгенерировать занятия по расписанию",
            Self::LessonSheet => "Журнал занятия",
            Self::AddExercise => "Добавить упражнение",
            Self::SignOut => "Выйти из аккаунта",
            Self::Quit => "Завершить работу",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn actions_for(account: &Account) -> Vec<Action> {
    let mut actions = vec![Action::Dashboard, Action::StudentCard, Action::CourseCard];
    if account.is_admin() {
        actions.extend([
            Action::CreateStudent,
            Action::CreateCourse,
            Action::Enroll,
            Action::EndEnrollment,
            Action::LinkGuardian,
            Action::Subscribe,
            Action::GrantRole,
            Action::DeleteCourse,
        ]);
    }
    if account.is_admin() || account.is_teacher() {
        actions.extend([
            Action::CreateLesson,
            Action::GenerateLessons,
            Action::LessonSheet,
            Action::AddExercise,
        ]);
    }
    actions.extend([Action::SignOut, Action::Quit]);
    actions
}

fn ui_err(e: InquireError) -> DomainError {
    DomainError::Ui(e.to_string())
}

/// `None` when the user pressed Esc.
fn cancellable<T>(result: Result<T, InquireError>) -> Result<Option<T>, DomainError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(InquireError::OperationCanceled) => Ok(None),
        Err(e) => Err(ui_err(e)),
    }
}

fn ask(message: &str) -> Result<Option<String>, DomainError> {
    cancellable(Text::new(message).prompt())
}

fn ask_default(message: &str, default: &str) -> Result<Option<String>, DomainError> {
    cancellable(Text::new(message).with_default(default).prompt())
}

fn choose<T: Clone>(message: &str, options: Vec<Choice<T>>) -> Result<Option<T>, DomainError> {
    if options.is_empty() {
        println!("Список пуст.");
        return Ok(None);
    }
    Ok(cancellable(Select::new(message, options).prompt())?.map(|c| c.value))
}

fn confirm(message: &str) -> Result<bool, DomainError> {
    Ok(cancellable(Confirm::new(message).with_default(false).prompt())?.unwrap_or(false))
}

/// Accepts `31.12.2024` and `2024-12-31`.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn show_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Price in minor units from `4500`, `4500.5` or `4500,50`.
fn parse_price(raw: &str) -> Option<i64> {
    let raw = raw.trim().replace(',', ".");
    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw.as_str(), ""),
    };
    if whole.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(if whole < 0 { -frac } else { frac })
}

fn report(e: &DomainError) {
    match e {
        DomainError::Validation(_) | DomainError::Forbidden(_) | DomainError::NotFound { .. } => {
            println!("⚠ {}", e.user_message());
        }
        other => {
            warn!(error = %other, "action failed");
            println!("⚠ Ошибка: {other}");
        }
    }
}

fn student_choices(students: &[Student]) -> Vec<Choice<i64>> {
    students
        .iter()
        .map(|s| Choice::new(format!("{} (#{})", s.full_name(), s.id), s.id))
        .collect()
}

fn course_choices(courses: &[Course]) -> Vec<Choice<i64>> {
    courses
        .iter()
        .map(|c| Choice::new(format!("{} (#{})", c.title, c.id), c.id))
        .collect()
}

fn lesson_choices(lessons: &[Lesson]) -> Vec<Choice<i64>> {
    lessons
        .iter()
        .map(|l| {
            let topic = if l.topic.is_empty() { "без темы" } else { l.topic.as_str() };
            Choice::new(format!("{} {}", show_date(l.date), topic), l.id)
        })
        .collect()
}

fn print_student_detail(detail: &StudentDetail) {
    let s = &detail.student;
    println!("\n== {} ==", s.full_name());
    if let Some(birth) = s.birth_date {
        println!("Дата рождения: {}", show_date(birth));
    }
    if !s.guardian_name.is_empty() || !s.guardian_phone.is_empty() {
        println!("Контакт: {} {}", s.guardian_name, s.guardian_phone);
    }
    let b = &detail.balance;
    println!(
        "Занятий куплено: {}, проведено: {}, осталось: {}, долг: {}",
        b.purchased, b.used, b.remaining, b.debt
    );
    if !detail.subscriptions.is_empty() {
        println!("Абонементы:");
        for sub in &detail.subscriptions {
            println!(
                "  {} | {} занятий | {} ₽{}",
                show_date(sub.purchase_date),
                sub.lessons_included,
                sub.price_display(),
                if sub.is_active { "" } else { " (неактивен)" }
            );
        }
    }
    if !detail.attendance.is_empty() {
        println!("Посещаемость:");
        for view in &detail.attendance {
            let a = &view.record.attendance;
            let p = &view.progress;
            println!(
                "  {} {} | {} | задачи {}/{} (частично {}){}",
                show_date(view.record.lesson_date),
                view.record.course_title,
                a.status.label(),
                p.solved,
                p.total,
                p.partial,
                if a.comment.is_empty() {
                    String::new()
                } else {
                    format!(" | {}", a.comment)
                }
            );
        }
    }
}

fn print_course_detail(detail: &CourseDetail) {
    let c = &detail.course;
    println!("\n== {} ==", c.title);
    if !c.description.is_empty() {
        println!("{}", c.description);
    }
    if !c.schedule.is_empty() {
        println!("Расписание: {}", c.schedule_display());
    }
    if let Some(capacity) = c.capacity {
        println!("Мест: {capacity}");
    }
    if let Some(teacher) = &detail.teacher {
        println!("Учитель: {} {}", teacher.display_name, teacher.phone);
    }
    println!("Ученики:");
    for e in &detail.enrollments {
        println!(
            "  {} с {}{}{}",
            e.student.full_name(),
            show_date(e.enrollment.start_date),
            e.enrollment
                .end_date
                .map(|d| format!(" по {}", show_date(d)))
                .unwrap_or_default(),
            if e.enrollment.is_active { "" } else { " (неактивна)" }
        );
    }
    println!("Занятия: {}", detail.lessons.len());
    for lesson in detail.lessons.iter().take(10) {
        println!("  {} {}", show_date(lesson.date), lesson.topic);
    }
}

fn print_sheet(sheet: &LessonSheet) {
    println!(
        "\n== {} · {} · {} ==",
        sheet.course.title,
        show_date(sheet.lesson.date),
        sheet.lesson.topic
    );
    for (i, ex) in sheet.exercises.iter().enumerate() {
        println!("  {}. {}", i + 1, ex.title);
    }
    for row in &sheet.rows {
        let marks: Vec<&str> = row.results.iter().map(|r| r.status.label()).collect();
        println!(
            "{} | {} | {}",
            row.student.full_name(),
            row.attendance.status.label(),
            marks.join(", ")
        );
    }
}

/// TUI adapter. Inquire prompts over the application services.
pub struct TuiInputPort {
    auth: Arc<AuthService>,
    roster: Arc<RosterService>,
    enrollments: Arc<EnrollmentService>,
    lessons: Arc<LessonService>,
    schedule: Arc<ScheduleService>,
    billing: Arc<BillingService>,
    dashboard: Arc<DashboardService>,
    clock: Arc<dyn Clock>,
}

impl TuiInputPort {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: Arc<AuthService>,
        roster: Arc<RosterService>,
        enrollments: Arc<EnrollmentService>,
        lessons: Arc<LessonService>,
        schedule: Arc<ScheduleService>,
        billing: Arc<BillingService>,
        dashboard: Arc<DashboardService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auth,
            roster,
            enrollments,
            lessons,
            schedule,
            billing,
            dashboard,
            clock,
        }
    }

    fn ask_date(&self, message: &str) -> Result<Option<NaiveDate>, DomainError> {
        let today = show_date(self.clock.today());
        loop {
            let Some(raw) = ask_default(message, &today)? else {
                return Ok(None);
            };
            match parse_date(&raw) {
                Some(date) => return Ok(Some(date)),
                None => println!("Введите дату в формате ДД.ММ.ГГГГ"),
            }
        }
    }

    /// `Ok(None)` on a failed attempt; `Err(Ui)` when the user leaves the start menu.
    async fn sign_in(&self) -> Result<Option<Account>, DomainError> {
        let options = vec![
            Choice::new("Войти по номеру телефона", Some(CodePurpose::Login)),
            Choice::new("Зарегистрироваться", Some(CodePurpose::Registration)),
            Choice::new("Выход", None),
        ];
        let Some(Some(purpose)) = choose("Добро пожаловать", options)? else {
            return Err(DomainError::Ui("start menu closed".into()));
        };
        let Some(phone) = ask("Номер телефона:")? else {
            return Ok(None);
        };
        if let Err(e) = self.auth.request_code(&phone, purpose).await {
            report(&e);
            return Ok(None);
        }
        println!("Код подтверждения отправлен.");
        let Some(code) = ask("Код из сообщения:")? else {
            return Ok(None);
        };
        let result = match purpose {
            CodePurpose::Login => self.auth.login(&phone, &code).await,
            CodePurpose::Registration => {
                let name = ask("Как к вам обращаться?")?.unwrap_or_default();
                self.auth.register(&phone, &code, &name).await
            }
        };
        match result {
            Ok(account) => Ok(Some(account)),
            Err(e) => {
                report(&e);
                Ok(None)
            }
        }
    }

    /// Returns false when the user chose to quit.
    async fn session(&self, account: Account) -> Result<bool, DomainError> {
        let mut account = account;
        println!("Здравствуйте, {}!", account.display_name);
        loop {
            account = self.auth.reload(&account).await?;
            let Some(action) = cancellable(
                Select::new("Меню", actions_for(&account)).prompt(),
            )?
            else {
                continue;
            };
            let outcome = match action {
                Action::SignOut => return Ok(true),
                Action::Quit => return Ok(false),
                Action::Dashboard => self.show_dashboard(&account).await,
                Action::StudentCard => self.student_card(&account).await,
                Action::CourseCard => self.course_card(&account).await,
                Action::CreateStudent => self.create_student(&account).await,
                Action::CreateCourse => self.create_course(&account).await,
                Action::Enroll => self.enroll(&account).await,
                Action::EndEnrollment => self.end_enrollment(&account).await,
                Action::LinkGuardian => self.link_guardian(&account).await,
                Action::Subscribe => self.subscribe(&account).await,
                Action::GrantRole => self.grant_role(&account).await,
                Action::DeleteCourse => self.delete_course(&account).await,
                Action::CreateLesson => self.create_lesson(&account).await,
                Action::GenerateLessons => self.generate_lessons(&account).await,
                Action::LessonSheet => self.lesson_sheet(&account).await,
                Action::AddExercise => self.add_exercise(&account).await,
            };
            match outcome {
                Ok(()) => {}
                Err(e @ DomainError::Ui(_)) => return Err(e),
                Err(e) => report(&e),
            }
        }
    }

    async fn show_dashboard(&self, actor: &Account) -> Result<(), DomainError> {
        match self.dashboard.dashboard(actor).await? {
            Dashboard::Admin {
                courses,
                students,
                recent_subscriptions,
            } => {
                println!("\nКурсы: {}", courses.len());
                for c in &courses {
                    println!("  {} {}", c.title, c.schedule_display());
                }
                println!("Ученики:");
                for s in &students {
                    let marker = if s.balance.in_debt() { " ⚠ долг" } else { "" };
                    println!(
                        "  {} | осталось {} | долг {}{}",
                        s.student.full_name(),
                        s.balance.remaining,
                        s.balance.debt,
                        marker
                    );
                }
                println!("Последние абонементы:");
                for sub in &recent_subscriptions {
                    println!(
                        "  {} ученик #{} | {} занятий | {} ₽",
                        show_date(sub.purchase_date),
                        sub.student_id,
                        sub.lessons_included,
                        sub.price_display()
                    );
                }
            }
            Dashboard::Teacher { courses } => {
                for c in &courses {
                    println!("\n{} ({} занятий)", c.course.title, c.lessons.len());
                    for l in c.lessons.iter().take(5) {
                        println!("  {} {}", show_date(l.date), l.topic);
                    }
                }
            }
            Dashboard::Parent { children } => {
                for child in &children {
                    print_student_detail(child);
                }
            }
            Dashboard::Guest => {
                println!("У вашего аккаунта пока нет роли. Обратитесь к администратору.");
            }
        }
        Ok(())
    }

    async fn pick_student(&self, actor: &Account) -> Result<Option<i64>, DomainError> {
        let students = self.roster.visible_students(actor).await?;
        choose("Ученик", student_choices(&students))
    }

    async fn pick_course(&self, actor: &Account, managed_only: bool) -> Result<Option<i64>, DomainError> {
        let mut courses = self.roster.visible_courses(actor).await?;
        if managed_only {
            courses.retain(|c| can_manage_course(actor, c));
        }
        choose("Курс", course_choices(&courses))
    }

    async fn pick_lesson(&self, actor: &Account) -> Result<Option<i64>, DomainError> {
        let Some(course_id) = self.pick_course(actor, true).await? else {
            return Ok(None);
        };
        let lessons = self.lessons.lessons_for_course(actor, course_id).await?;
        choose("Занятие", lesson_choices(&lessons))
    }

    async fn student_card(&self, actor: &Account) -> Result<(), DomainError> {
        if let Some(id) = self.pick_student(actor).await? {
            print_student_detail(&self.roster.student_detail(actor, id).await?);
        }
        Ok(())
    }

    async fn course_card(&self, actor: &Account) -> Result<(), DomainError> {
        if let Some(id) = self.pick_course(actor, false).await? {
            print_course_detail(&self.roster.course_detail(actor, id).await?);
        }
        Ok(())
    }

    async fn create_student(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(last_name) = ask("Фамилия:")? else { return Ok(()) };
        let Some(first_name) = ask("Имя:")? else { return Ok(()) };
        let middle_name = ask("Отчество (необязательно):")?.unwrap_or_default();
        let birth_date = ask("Дата рождения ДД.ММ.ГГГГ (необязательно):")?
            .and_then(|raw| parse_date(&raw));
        let guardian_name = ask("Контактное лицо (необязательно):")?.unwrap_or_default();
        let guardian_phone = ask("Телефон контакта (необязательно):")?.unwrap_or_default();
        let notes = ask("Заметки (необязательно):")?.unwrap_or_default();

        let courses = self.roster.visible_courses(actor).await?;
        let course_ids: Vec<i64> = if courses.is_empty() {
            Vec::new()
        } else {
            cancellable(MultiSelect::new("Записать на курсы", course_choices(&courses)).prompt())?
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.value)
                .collect()
        };

        let student = self
            .roster
            .create_student(
                actor,
                &NewStudent {
                    first_name,
                    last_name,
                    middle_name,
                    birth_date,
                    guardian_name,
                    guardian_phone,
                    notes,
                },
                &course_ids,
            )
            .await?;
        println!("Ученик {} добавлен (#{}).", student.full_name(), student.id);
        Ok(())
    }

    async fn create_course(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(title) = ask("Название курса:")? else { return Ok(()) };
        let description = ask("Описание:")?.unwrap_or_default();
        let schedule = ask("Дни занятий (mon,tue,wed,thu,fri,sat,sun):")?.unwrap_or_default();
        let capacity = ask("Мест (необязательно):")?.and_then(|raw| raw.trim().parse::<u32>().ok());

        let teachers = self.roster.accounts_with_role(actor, Role::Teacher).await?;
        let mut options = vec![Choice::new("Без учителя", None)];
        options.extend(teachers.iter().map(|t| {
            Choice::new(format!("{} {}", t.display_name, t.phone), Some(t.id))
        }));
        let Some(teacher_id) = choose("Учитель", options)? else { return Ok(()) };

        let course = self
            .roster
            .create_course(
                actor,
                &NewCourse {
                    title,
                    description,
                    schedule,
                    capacity,
                    teacher_id,
                },
            )
            .await?;
        println!("Курс «{}» создан (#{}).", course.title, course.id);
        Ok(())
    }

    async fn enroll(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(student_id) = self.pick_student(actor).await? else { return Ok(()) };
        let Some(course_id) = self.pick_course(actor, false).await? else { return Ok(()) };
        let Some(start_date) = self.ask_date("Дата начала:")? else { return Ok(()) };
        let enrollment = self
            .enrollments
            .enroll(
                actor,
                &EnrollmentDraft {
                    student_id,
                    course_id,
                    start_date,
                    end_date: None,
                    is_active: true,
                },
            )
            .await?;
        println!("Запись #{} создана.", enrollment.id);
        Ok(())
    }

    async fn end_enrollment(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(student_id) = self.pick_student(actor).await? else { return Ok(()) };
        let courses = self.roster.visible_courses(actor).await?;
        let title = |id: i64| {
            courses
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.title.clone())
                .unwrap_or_else(|| format!("курс #{id}"))
        };
        let options: Vec<Choice<i64>> = self
            .enrollments
            .enrollments_for_student(student_id)
            .await?
            .into_iter()
            .filter(|e| e.is_active)
            .map(|e| {
                Choice::new(
                    format!("{} с {}", title(e.course_id), show_date(e.start_date)),
                    e.id,
                )
            })
            .collect();
        let Some(id) = choose("Активная запись", options)? else { return Ok(()) };
        self.enrollments.deactivate(actor, id).await?;
        println!("Запись завершена.");
        Ok(())
    }

    async fn link_guardian(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(student_id) = self.pick_student(actor).await? else { return Ok(()) };
        let Some(phone) = ask("Телефон родителя:")? else { return Ok(()) };
        let link = self.roster.link_guardian(actor, student_id, &phone).await?;
        if link.already_linked {
            println!("Родитель уже привязан к ученику.");
        } else {
            println!(
                "{} привязан(а) к ученику {}.",
                link.guardian.display_name,
                link.student.full_name()
            );
        }
        Ok(())
    }

    async fn subscribe(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(student_id) = self.pick_student(actor).await? else { return Ok(()) };
        let Some(course_id) = self.pick_course(actor, false).await? else { return Ok(()) };
        let Some(lessons) = ask_default("Количество занятий:", "4")? else { return Ok(()) };
        let Ok(lessons_included) = lessons.trim().parse::<u32>() else {
            println!("Введите целое число.");
            return Ok(());
        };
        let Some(price) = ask("Стоимость, ₽:")? else { return Ok(()) };
        let Some(price_minor) = parse_price(&price) else {
            println!("Введите сумму, например 4500 или 4500.50");
            return Ok(());
        };
        let Some(purchase_date) = self.ask_date("Дата покупки:")? else { return Ok(()) };
        let sub = self
            .billing
            .create_subscription(
                actor,
                &NewSubscription {
                    student_id,
                    course_id,
                    lessons_included,
                    price_minor,
                    purchase_date,
                    is_active: true,
                },
            )
            .await?;
        println!("Абонемент #{} оформлен.", sub.id);
        Ok(())
    }

    async fn grant_role(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(phone) = ask("Телефон пользователя:")? else { return Ok(()) };
        let account = self.auth.account_by_phone(actor, &phone).await?;
        let options = Role::ALL
            .into_iter()
            .filter(|r| !account.has_role(*r))
            .map(|r| Choice::new(r.group_name(), r))
            .collect();
        let Some(role) = choose("Роль", options)? else { return Ok(()) };
        let updated = self.auth.grant_role(actor, account.id, role).await?;
        let roles: Vec<&str> = updated.roles.iter().map(|r| r.group_name()).collect();
        println!("{}: {}", updated.phone, roles.join(", "));
        Ok(())
    }

    async fn delete_course(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(course_id) = self.pick_course(actor, false).await? else { return Ok(()) };
        if !confirm("Удалить курс вместе с занятиями, записями и абонементами?")? {
            return Ok(());
        }
        self.roster.delete_course(actor, course_id).await?;
        println!("Курс удалён.");
        Ok(())
    }

    async fn create_lesson(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(course_id) = self.pick_course(actor, true).await? else { return Ok(()) };
        let Some(date) = self.ask_date("Дата занятия:")? else { return Ok(()) };
        let topic = ask("Тема:")?.unwrap_or_default();
        let lesson = self
            .lessons
            .create_lesson(actor, &NewLesson { course_id, date, topic })
            .await?;
        println!("Занятие {} создано.", show_date(lesson.date));
        Ok(())
    }

    async fn generate_lessons(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(course_id) = self.pick_course(actor, true).await? else { return Ok(()) };
        let Some(raw_codes) = ask("Дни (пусто = расписание курса):")? else { return Ok(()) };
        let Some(start) = self.ask_date("Начиная с:")? else { return Ok(()) };
        let weeks = ask("Недель вперёд (пусто = по умолчанию):")?
            .and_then(|raw| raw.trim().parse::<u32>().ok());

        let created = if raw_codes.trim().is_empty() {
            self.schedule
                .generate_from_course_schedule(actor, course_id, Some(start), weeks)
                .await?
        } else {
            let codes: Vec<&str> = raw_codes.split(',').map(str::trim).collect();
            self.schedule
                .generate_lessons(actor, course_id, &codes, Some(start), weeks)
                .await?
        };
        println!("Создано занятий: {created}");
        Ok(())
    }

    async fn lesson_sheet(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(lesson_id) = self.pick_lesson(actor).await? else { return Ok(()) };
        let sheet = self.lessons.open_sheet(actor, lesson_id).await?;
        print_sheet(&sheet);
        if sheet.rows.is_empty() || !confirm("Отметить посещаемость и задачи?")? {
            return Ok(());
        }

        let mut update = LessonSheetUpdate::default();
        for row in &sheet.rows {
            let name = row.student.full_name();
            let statuses: Vec<Choice<AttendanceStatus>> = AttendanceStatus::ALL
                .into_iter()
                .map(|s| Choice::new(s.label(), s))
                .collect();
            let cursor = AttendanceStatus::ALL
                .iter()
                .position(|s| *s == row.attendance.status)
                .unwrap_or(0);
            let Some(status) = cancellable(
                Select::new(&name, statuses).with_starting_cursor(cursor).prompt(),
            )?
            else {
                return Ok(());
            };
            let comment = ask_default("Комментарий:", &row.attendance.comment)?;
            update.attendance.push(AttendanceUpdate {
                student_id: row.student.id,
                status: status.value.as_str().to_string(),
                comment,
            });

            for result in &row.results {
                let title = sheet
                    .exercises
                    .iter()
                    .find(|e| e.id == result.exercise_id)
                    .map(|e| e.title.as_str())
                    .unwrap_or("Задача");
                let options: Vec<Choice<ExerciseStatus>> = ExerciseStatus::ALL
                    .into_iter()
                    .map(|s| Choice::new(s.label(), s))
                    .collect();
                let cursor = ExerciseStatus::ALL
                    .iter()
                    .position(|s| *s == result.status)
                    .unwrap_or(0);
                let prompt = format!("{name}: {title}");
                let Some(status) = cancellable(
                    Select::new(&prompt, options)
                        .with_starting_cursor(cursor)
                        .prompt(),
                )?
                else {
                    return Ok(());
                };
                update.results.push(ResultUpdate {
                    exercise_id: result.exercise_id,
                    student_id: result.student_id,
                    status: status.value.as_str().to_string(),
                    comment: None,
                });
            }
        }

        let saved = self.lessons.save_sheet(actor, lesson_id, &update).await?;
        print_sheet(&saved);
        Ok(())
    }

    async fn add_exercise(&self, actor: &Account) -> Result<(), DomainError> {
        let Some(lesson_id) = self.pick_lesson(actor).await? else { return Ok(()) };
        let Some(title) = ask("Упражнение:")? else { return Ok(()) };
        let description = ask("Описание:")?.unwrap_or_default();
        let exercise = self
            .lessons
            .add_exercise(
                actor,
                lesson_id,
                &NewExercise {
                    title,
                    description,
                    order: 0,
                },
            )
            .await?;
        println!("Упражнение №{} добавлено.", exercise.order);
        Ok(())
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        loop {
            let account = match self.sign_in().await {
                Ok(Some(account)) => account,
                Ok(None) => continue,
                Err(DomainError::Ui(_)) => return Ok(()),
                Err(e) => return Err(e),
            };
            info!(account_id = account.id, "session started");
            let keep_going = self.session(account).await?;
            if !keep_going {
                return Ok(());
            }
        }
    }
}
