//! Interactive workout screen: live session clock, exercise checklist and
//! rest timer.

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, KeyCode, KeyEventKind};
use ratatui::{
    DefaultTerminal,
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use tokio::sync::mpsc::UnboundedReceiver;

use setwise::clock::format_elapsed;
use setwise::db::SqliteStore;
use setwise::rest_timer::{RestEvent, RestIntervalTimer, RestState};
use setwise::session::{FinishOutcome, WorkoutSessionManager};
use setwise::store::PlanWithExercises;

const HELP: &str = "j/k: move | space: toggle | r: rest | p: pause/resume | +: +30s | x: reset rest | f: finish | q: quit";
const EXTEND_SECONDS: u32 = 30;

struct WorkoutView<'a> {
    manager: &'a WorkoutSessionManager<SqliteStore>,
    plan: &'a PlanWithExercises,
    selected: usize,
    rest: RestIntervalTimer,
    rest_events: UnboundedReceiver<RestEvent>,
    rest_label: Option<String>,
    default_rest: u32,
    status_message: String,
}

impl<'a> WorkoutView<'a> {
    fn new(
        manager: &'a WorkoutSessionManager<SqliteStore>,
        plan: &'a PlanWithExercises,
        default_rest: u32,
    ) -> Self {
        let (rest, rest_events) = RestIntervalTimer::new();
        Self {
            manager,
            plan,
            selected: 0,
            rest,
            rest_events,
            rest_label: None,
            default_rest,
            status_message: HELP.to_string(),
        }
    }

    fn scroll_down(&mut self) {
        if self.selected + 1 < self.plan.exercises.len() {
            self.selected += 1;
        }
    }

    fn scroll_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn start_rest(&mut self) {
        let Some(exercise) = self.plan.exercises.get(self.selected) else {
            return;
        };
        let seconds = u32::try_from(exercise.rest_seconds)
            .ok()
            .filter(|s| *s > 0)
            .unwrap_or(self.default_rest);
        self.rest.start(seconds);
        self.rest_label = Some(exercise.name.clone());
        self.status_message = format!(
            "Resting {} after {}",
            format_elapsed(u64::from(seconds)),
            exercise.name
        );
    }

    fn toggle_rest_pause(&mut self) {
        match self.rest.state() {
            RestState::Running => self.rest.pause(),
            RestState::Paused => self.rest.resume(),
            RestState::Idle | RestState::Finished => {}
        }
    }

    async fn toggle_selected(&mut self) {
        let Some(exercise) = self.plan.exercises.get(self.selected) else {
            return;
        };
        match self
            .manager
            .toggle_exercise_completion(exercise.id, None)
            .await
        {
            Ok(outcome) => {
                let progress = outcome.progress;
                self.status_message = if progress.completed {
                    format!("{} done ({} sets)", progress.name, progress.completed_sets)
                } else {
                    format!("{} marked not done", progress.name)
                };
                if let Some(warning) = outcome.warning {
                    self.status_message =
                        format!("{} - not saved yet: {}", self.status_message, warning);
                }
                if progress.completed {
                    self.start_rest();
                }
            }
            Err(e) => self.status_message = format!("Could not update {}: {}", exercise.name, e),
        }
    }

    fn drain_rest_events(&mut self) {
        while let Ok(event) = self.rest_events.try_recv() {
            if event == RestEvent::Completed {
                let label = self.rest_label.as_deref().unwrap_or("rest");
                self.status_message = format!("Rest over ({}). {}", label, HELP);
            }
        }
    }

    fn draw(&self, terminal: &mut DefaultTerminal) -> Result<()> {
        let progress = self.manager.progress();
        let elapsed = self.manager.elapsed_display();
        let rest_state = self.rest.state();
        let rest_remaining = format_elapsed(u64::from(self.rest.remaining_seconds()));

        terminal.draw(|frame| {
            let chunks = Layout::vertical([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(frame.area());

            let header = Paragraph::new(format!("{}  |  {}", self.plan.plan.name, elapsed))
                .style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(header, chunks[0]);

            let done = progress.iter().filter(|p| p.completed).count();
            let items: Vec<ListItem> = progress
                .iter()
                .enumerate()
                .map(|(idx, p)| {
                    let mark = if p.completed { "x" } else { " " };
                    let content = format!(
                        "[{}] {}: {}/{} sets x {} reps",
                        mark, p.name, p.completed_sets, p.target_sets, p.target_reps
                    );
                    let style = if idx == self.selected {
                        Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD)
                    } else if p.completed {
                        Style::default().fg(Color::Green)
                    } else {
                        Style::default()
                    };
                    ListItem::new(content).style(style)
                })
                .collect();
            let list = List::new(items).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Exercises ({}/{} done)", done, progress.len())),
            );
            let mut list_state = ListState::default();
            list_state.select(Some(self.selected));
            frame.render_stateful_widget(list, chunks[1], &mut list_state);

            let (rest_text, rest_color) = match rest_state {
                RestState::Idle => ("no rest running".to_string(), Color::Gray),
                RestState::Running => (format!("resting: {}", rest_remaining), Color::Yellow),
                RestState::Paused => (format!("paused: {}", rest_remaining), Color::Magenta),
                RestState::Finished => ("rest over".to_string(), Color::Green),
            };
            let rest = Paragraph::new(rest_text)
                .style(Style::default().fg(rest_color))
                .block(Block::default().borders(Borders::ALL).title("Rest"));
            frame.render_widget(rest, chunks[2]);

            let footer = Paragraph::new(self.status_message.as_str())
                .style(Style::default().fg(Color::White))
                .block(Block::default().borders(Borders::ALL).title("Status"));
            frame.render_widget(footer, chunks[3]);
        })?;
        Ok(())
    }
}

/// Runs the screen until the user finishes (returning the outcome) or quits
/// (leaving the session open).
pub async fn run_workout(
    mut terminal: DefaultTerminal,
    manager: &WorkoutSessionManager<SqliteStore>,
    plan: &PlanWithExercises,
    default_rest: u32,
) -> Result<Option<FinishOutcome>> {
    let mut view = WorkoutView::new(manager, plan, default_rest);

    loop {
        view.drain_rest_events();
        view.draw(&mut terminal)?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let event::Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
            KeyCode::Char('j') | KeyCode::Down => view.scroll_down(),
            KeyCode::Char('k') | KeyCode::Up => view.scroll_up(),
            KeyCode::Char(' ') | KeyCode::Enter => view.toggle_selected().await,
            KeyCode::Char('r') => view.start_rest(),
            KeyCode::Char('p') => view.toggle_rest_pause(),
            KeyCode::Char('+') => view.rest.extend(EXTEND_SECONDS),
            KeyCode::Char('x') => view.rest.reset(),
            KeyCode::Char('f') => {
                view.rest.reset();
                return Ok(Some(manager.finish_session().await?));
            }
            _ => {}
        }
    }
}
