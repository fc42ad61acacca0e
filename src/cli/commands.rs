use crate::error::BridgeResult;
use crate::mapping::{ExtractionRule, MappingRegistry};
use crate::service::Questionnaire;
use crate::types::{QuestionWithResponse, ResponseInput};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// First non-empty label of a question, for one-line listings
fn question_label(q: &QuestionWithResponse) -> &str {
    let question = &q.question;
    [
        &question.title,
        &question.question_text,
        &question.description,
        &question.question_text_fr,
    ]
    .into_iter()
    .find_map(|field| field.as_deref())
    .unwrap_or("(untitled)")
}

fn answer_text(q: &QuestionWithResponse) -> Option<&str> {
    q.response
        .as_ref()
        .and_then(|r| r.response_text.as_deref())
        .filter(|t| !t.trim().is_empty())
}

/// Export destination: a directory receives the dated default name
fn resolve_output(output: Option<PathBuf>, filename: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path,
        None => PathBuf::from(filename),
    }
}

/// Execute the import command
pub fn import(questionnaire: &Questionnaire, file: &Path, verbose: bool) -> BridgeResult<()> {
    println!("{}", "📥 Questionnaire Import".bold().green());
    println!("   File: {}\n", file.display());

    let summary = questionnaire.import(file)?;

    println!("{}", "✅ Import Complete!".bold().green());
    println!("   Sheets:           {}", summary.sheet_count);
    println!("   Questions:        {}", summary.question_count);
    println!("   Seeded answers:   {}", summary.seeded_responses);
    println!("   Template version: {}", summary.template_version);

    if !summary.ignored_tabs.is_empty() {
        println!(
            "\n   {} {} tab(s) not in the sheet mapping:",
            "⚠️ ".yellow(),
            summary.ignored_tabs.len()
        );
        for tab in &summary.ignored_tabs {
            println!("      {}", format!("{:?}", tab).yellow());
        }
    }

    if verbose {
        println!();
        for sheet in questionnaire.sheets()? {
            let count = questionnaire.questions(sheet.id, None)?.len();
            println!(
                "   📋 {} {}",
                sheet.name.bright_blue().bold(),
                format!("({} questions)", count).dimmed()
            );
        }
    }
    println!();

    Ok(())
}

/// Execute the export command
pub fn export(
    questionnaire: &Questionnaire,
    output: Option<PathBuf>,
    version: Option<i64>,
) -> BridgeResult<()> {
    println!("{}", "📤 Questionnaire Export".bold().green());

    let result = questionnaire.export(version)?;
    let path = resolve_output(output, &result.filename);
    fs::write(&path, &result.bytes)?;

    println!("{}", "✅ Export Complete!".bold().green());
    println!("   File:             {}", path.display());
    println!("   Template version: {}", result.template_version);
    println!("   Answers written:  {}", result.cells_written);
    if result.cells_skipped > 0 {
        println!(
            "   {}",
            format!("Answers skipped:  {} (tab missing from template)", result.cells_skipped)
                .yellow()
        );
    }
    println!();

    Ok(())
}

/// Execute the sheets command
pub fn sheets(questionnaire: &Questionnaire) -> BridgeResult<()> {
    let sheets = questionnaire.sheets()?;
    if sheets.is_empty() {
        println!("{}", "No sheets imported yet. Run 'qbridge import <file>'.".yellow());
        return Ok(());
    }

    println!("{}", "📋 Sheets".bold().green());
    for sheet in sheets {
        println!(
            "   {:>3}  {}",
            sheet.id.to_string().cyan(),
            sheet.name.bright_blue().bold()
        );
        if let Some(description) = &sheet.description {
            println!("        {}", description.dimmed());
        }
    }
    let (sheet_count, question_count) = questionnaire.counts()?;
    println!(
        "\n   {} sheets, {} questions\n",
        sheet_count, question_count
    );
    Ok(())
}

/// Execute the questions command
pub fn questions(
    questionnaire: &Questionnaire,
    sheet_id: i64,
    search: Option<String>,
) -> BridgeResult<()> {
    let questions = questionnaire.questions(sheet_id, search.as_deref())?;

    println!(
        "{}",
        format!("❓ Questions in sheet {} ({})", sheet_id, questions.len())
            .bold()
            .green()
    );
    for q in &questions {
        let question = &q.question;
        let cell = format!("{}{}", question.cell_column, question.row_number);
        let id = question.external_id.as_deref().unwrap_or("");
        println!(
            "   {:>4}  {:<5} {:<8} {}",
            question.id.to_string().cyan(),
            cell,
            id,
            question_label(q)
        );
        match answer_text(q) {
            Some(text) => println!("               {} {}", "→".green(), text),
            None => println!("               {}", "(no answer)".dimmed()),
        }
    }
    println!();
    Ok(())
}

/// Execute the respond command
pub fn respond(questionnaire: &Questionnaire, question_id: i64, text: String) -> BridgeResult<()> {
    let response = questionnaire.save_response(
        question_id,
        &ResponseInput {
            response_text: Some(text),
            ..Default::default()
        },
    )?;

    println!(
        "{} question {} (response {})",
        "✅ Saved answer for".bold().green(),
        question_id.to_string().cyan(),
        response.id
    );
    Ok(())
}

/// Execute the templates command
pub fn templates(questionnaire: &Questionnaire) -> BridgeResult<()> {
    let templates = questionnaire.templates()?;
    if templates.is_empty() {
        println!("{}", "No template stored yet.".yellow());
        return Ok(());
    }

    println!("{}", "🗂  Template versions".bold().green());
    for info in templates {
        println!(
            "   {:<6} {}  {} bytes",
            format!("v{}", info.version).cyan(),
            info.imported_at,
            info.size_bytes
        );
    }
    println!();
    Ok(())
}

/// Execute the mapping command: print the active registry, or save it as
/// YAML when `output` is given
pub fn mapping(registry: &MappingRegistry, output: Option<PathBuf>) -> BridgeResult<()> {
    if let Some(path) = output {
        fs::write(&path, registry.to_yaml()?)?;
        println!(
            "{} {}",
            "✅ Sheet mapping written to".bold().green(),
            path.display()
        );
        return Ok(());
    }

    println!("{}", "🧭 Sheet mapping".bold().green());
    for (order, sheet) in registry.ordered() {
        let shape = match &sheet.rule {
            ExtractionRule::FixedCells { cells } => format!("{} fixed cells", cells.len()),
            ExtractionRule::RowRange(range) => format!(
                "rows {}-{}, answers in column {}",
                range.start_row,
                range.end_row,
                range.response_column.letters()
            ),
        };
        println!(
            "   {}. {}  {}",
            order,
            format!("{:?}", sheet.name).bright_blue().bold(),
            shape.dimmed()
        );
    }
    println!();
    Ok(())
}
