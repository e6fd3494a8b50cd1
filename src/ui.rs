use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, StatefulWidget, Widget, Wrap},
};
use webbrowser::Browser;

use loctag::{
    readout::{format_degrees, MSG_START},
    tag::{format_date, Field},
};

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(1),    // screen
                Constraint::Length(1), // notice
                Constraint::Length(1), // legend
            ])
            .split(area);

        match self.state {
            AppState::Current => render_current(self, chunks[0], buf),
            AppState::Details => render_details(self, chunks[0], buf),
            AppState::Locations => render_locations(self, chunks[0], buf),
        }

        if let Some(notice) = &self.notice {
            Paragraph::new(Span::styled(
                notice.as_str(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(chunks[1], buf);
        }

        Paragraph::new(Span::styled(
            legend(self),
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(chunks[2], buf);
    }
}

fn legend(app: &App) -> String {
    match app.state {
        AppState::Current => {
            let readout = app.readout();
            let mut keys = vec![format!("(g) {}", readout.action.to_lowercase())];
            if readout.can_tag {
                keys.push("(t)ag".to_string());
                if Browser::is_available() {
                    keys.push("(o)pen map".to_string());
                }
            }
            keys.push("(l)ocations".to_string());
            keys.push("(q)uit".to_string());
            keys.join(" / ")
        }
        AppState::Details => "(tab) next field / (←/→) category / (enter) save / (esc)ape".to_string(),
        AppState::Locations => {
            "(↑/↓) select / (enter) edit / (d)elete / (esc)ape".to_string()
        }
    }
}

fn render_current(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let readout = app.readout();

    let mut lines = vec![];
    if readout.message.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Latitude:  ", dim_style),
            Span::styled(readout.latitude.clone(), bold_style),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Longitude: ", dim_style),
            Span::styled(readout.longitude.clone(), bold_style),
        ]));
        lines.push(Line::default());
        lines.extend(
            readout
                .address
                .lines()
                .map(|l| Line::from(Span::styled(l.to_string(), bold_style))),
        );
    } else {
        let message_style = if readout.message == MSG_START {
            dim_style
        } else {
            Style::default().fg(Color::Yellow).patch(bold_style)
        };
        lines.push(Line::from(Span::styled(readout.message.clone(), message_style)));
    }

    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Current Location "),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(area, buf);
}

fn render_details(app: &App, area: Rect, buf: &mut Buffer) {
    let Some(form) = &app.form else {
        return;
    };
    let label_style = Style::default().add_modifier(Modifier::DIM);
    let value_style = Style::default().add_modifier(Modifier::BOLD);
    let focused_style = Style::default()
        .patch(value_style)
        .fg(Color::Green)
        .add_modifier(Modifier::UNDERLINED);
    let style_for = |field: Field| {
        if form.focus() == field {
            focused_style
        } else {
            value_style
        }
    };

    let photo = if !form.photo_path.is_empty() {
        form.photo_path.clone()
    } else if form.has_photo() {
        "(keep current photo)".to_string()
    } else {
        "(none)".to_string()
    };

    let row = |label: &'static str, value: String, style: Style| {
        Line::from(vec![
            Span::styled(format!("{label:<13}"), label_style),
            Span::styled(value, style),
        ])
    };

    let lines = vec![
        row("Description", form.description.clone(), style_for(Field::Description)),
        row("Category", format!("< {} >", form.category()), style_for(Field::Category)),
        row("Photo", photo, style_for(Field::PhotoPath)),
        Line::default(),
        row("Latitude", form.latitude_label(), value_style),
        row("Longitude", form.longitude_label(), value_style),
        row("Address", form.address_label(), value_style),
        row("Date", form.date_label(), value_style),
    ];

    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", form.title())),
        )
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn render_locations(app: &App, area: Rect, buf: &mut Buffer) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Saved Locations ({}) ", app.locations.len()));

    if app.locations.is_empty() {
        Paragraph::new("No tagged locations yet")
            .block(block)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center)
            .render(area, buf);
        return;
    }

    let items: Vec<ListItem> = app
        .locations
        .iter()
        .map(|loc| {
            let title = if loc.description.is_empty() {
                "(no description)".to_string()
            } else {
                loc.description.clone()
            };
            let photo = if loc.has_photo() { " [photo]" } else { "" };
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(
                        format!("  {}{}", loc.category, photo),
                        Style::default().fg(Color::Magenta),
                    ),
                ]),
                Line::from(Span::styled(
                    format!(
                        "  {}  {}, {}",
                        format_date(&loc.date),
                        format_degrees(loc.coordinate.latitude),
                        format_degrees(loc.coordinate.longitude)
                    ),
                    Style::default().add_modifier(Modifier::DIM),
                )),
                Line::from(format!("  {}", loc.address_line())),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(app.selected));
    StatefulWidget::render(list, area, buf, &mut state);
}
