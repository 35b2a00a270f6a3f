use std::fmt;

pub const ACTION_ITEM_COUNT: usize = 3;

/// A way the synthesized report deviates from the structure the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportIssue {
    MissingQuestionSections { expected: usize, found: usize },
    ActionItemCount { found: usize },
    NoCitations,
}

impl fmt::Display for ReportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportIssue::MissingQuestionSections { expected, found } => write!(
                f,
                "expected a subsection for each of the {} questions but found {} headings",
                expected, found
            ),
            ReportIssue::ActionItemCount { found } => write!(
                f,
                "expected exactly {} actionable insights but found {}",
                ACTION_ITEM_COUNT, found
            ),
            ReportIssue::NoCitations => write!(f, "no [Title](URL) citations were found"),
        }
    }
}

pub fn check_report(report: &str, question_count: usize) -> Vec<ReportIssue> {
    let mut issues = Vec::new();

    let headings = report
        .lines()
        .filter(|l| {
            let l = l.trim_start();
            l.starts_with("## ") || l.starts_with("### ") || l.starts_with("#### ")
        })
        .count();
    if headings < question_count {
        issues.push(ReportIssue::MissingQuestionSections {
            expected: question_count,
            found: headings,
        });
    }

    let found = action_items(report);
    if found != ACTION_ITEM_COUNT {
        issues.push(ReportIssue::ActionItemCount { found });
    }

    if !report.contains("](http") {
        issues.push(ReportIssue::NoCitations);
    }

    issues
}

/// Top-level list items under the last bold or heading line that announces
/// actionable insights, up to the next heading.
fn action_items(report: &str) -> usize {
    let lines: Vec<&str> = report.lines().collect();
    let Some(marker) = lines.iter().rposition(|l| is_action_marker(l)) else {
        return 0;
    };

    lines[marker + 1..]
        .iter()
        .take_while(|l| !l.trim_start().starts_with('#'))
        .filter(|l| !l.starts_with(char::is_whitespace) && is_list_item(l.trim_end()))
        .count()
}

fn is_action_marker(line: &str) -> bool {
    let line = line.trim();
    (line.starts_with("**") || line.starts_with('#'))
        && line.to_ascii_lowercase().contains("actionable")
}

fn is_list_item(line: &str) -> bool {
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ") {
        return true;
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    let rest = &line[digits..];
    digits > 0 && (rest.starts_with(". ") || rest.starts_with(") "))
}
