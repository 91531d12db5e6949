//! Report rendering: plain text, HTML, or JSON.

use crate::report::{NormalizedReport, Temperature};

/// Output flavour for `GET /`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Html,
    Json,
}

impl ReportFormat {
    /// Parse the `format` query parameter.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" | "plain" => Some(Self::Text),
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Pick a format from an `Accept` header. Browsers get HTML, everyone else text.
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(a) if a.contains("text/html") => Self::Html,
            Some(a) if a.contains("application/json") && !a.contains("*/*") => Self::Json,
            _ => Self::Text,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
            Self::Json => "application/json",
        }
    }
}

pub fn render(report: &NormalizedReport, format: ReportFormat) -> String {
    match format {
        ReportFormat::Text => render_text(report),
        ReportFormat::Html => render_html(report),
        ReportFormat::Json => {
            serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

fn pair(t: &Temperature) -> String {
    format!("{}\u{00B0}F ({}\u{00B0}C)", t.fahrenheit, t.celsius)
}

fn wind_line(report: &NormalizedReport) -> String {
    format!(
        "{}({}\u{00B0}) @ {}-{} mph",
        report.wind.compass, report.wind.degrees, report.wind.speed_mph, report.wind.gust_mph
    )
}

/// Label/value rows shared by the text and HTML layouts.
fn rows(report: &NormalizedReport) -> [(&'static str, String); 5] {
    [
        ("Current", pair(&report.temperature)),
        ("Feels Like", pair(&report.feels_like.temperature)),
        ("Dew Point", pair(&report.dew_point)),
        ("Humidity", format!("{}%", report.humidity)),
        ("Wind", wind_line(report)),
    ]
}

pub fn render_text(report: &NormalizedReport) -> String {
    let mut out = format!(
        "Current Conditions for {} at {} are:\n",
        report.station_id, report.observed_at
    );
    for (label, value) in rows(report) {
        out.push_str(&format!("{}: {}\n", label, value));
    }
    out
}

pub fn render_html(report: &NormalizedReport) -> String {
    let mut table = String::new();
    for (label, value) in rows(report) {
        table.push_str(&format!(
            "    <tr><th>{}</th><td>{}</td></tr>\n",
            label,
            escape_html(&value)
        ));
    }

    let station = escape_html(&report.station_id);
    let neighborhood = if report.neighborhood.is_empty() {
        String::new()
    } else {
        format!(" ({})", escape_html(&report.neighborhood))
    };

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         \x20 <meta charset=\"utf-8\">\n\
         \x20 <title>{station} current conditions</title>\n\
         </head>\n\
         <body>\n\
         \x20 <h1>Current Conditions for {station}{neighborhood}</h1>\n\
         \x20 <p>Observed at {time}</p>\n\
         \x20 <table>\n\
         {table}\
         \x20 </table>\n\
         </body>\n\
         </html>\n",
        station = station,
        neighborhood = neighborhood,
        time = escape_html(&report.observed_at),
        table = table,
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
