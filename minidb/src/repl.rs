//! The interactive front end.
//!
//! Reads one command per line. Lines starting with `.` are meta commands:
//!
//! - `.exit`: stop reading (the caller persists and closes the table)
//! - `.btree`: print the tree, one node per line
//! - `.seed [n]`: insert `n` random rows (default 10) after the largest id
//!
//! Everything else is a statement:
//!
//! - `insert <id> <username> <email>`
//! - `select`: print every row in id order
//! - `select <id>`: print one row
//!
//! End of input behaves like `.exit`.

use std::io::{self, BufRead, Write};

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::row::Row;
use crate::storage::Storage;
use crate::table::{Table, TableFull};

/// Printed before every line of input.
pub const PROMPT: &str = "minidb > ";

const DEFAULT_SEED_ROWS: u32 = 10;

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bob", "Charlie", "David", "Emma", "Frank", "Grace", "Henry", "Ivy", "Jack",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez",
];
const EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "example.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    Exit,
    BTree,
    Seed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(Row),
    Select,
    SelectOne(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareError {
    /// The first word is not a known statement.
    UnrecognizedStatement,
    /// Known statement, wrong arguments.
    SyntaxError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteResult {
    Success,
    TableFull,
    NotFound,
}

/// Parse a line starting with `.`, or `None` if the command is unknown.
#[must_use]
pub fn parse_meta_command(line: &str) -> Option<MetaCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        ".exit" => MetaCommand::Exit,
        ".btree" => MetaCommand::BTree,
        ".seed" => match words.next() {
            None => MetaCommand::Seed(DEFAULT_SEED_ROWS),
            Some(count) => MetaCommand::Seed(count.parse().ok()?),
        },
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(command)
}

/// Parse a statement line.
pub fn prepare_statement(line: &str) -> Result<Statement, PrepareError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["insert", args @ ..] => match args {
            [id, username, email] => {
                let id = id.parse().map_err(|_| PrepareError::SyntaxError)?;
                Ok(Statement::Insert(Row::new(id, username, email)))
            }
            _ => Err(PrepareError::SyntaxError),
        },
        ["select"] => Ok(Statement::Select),
        ["select", id] => id
            .parse()
            .map(Statement::SelectOne)
            .map_err(|_| PrepareError::SyntaxError),
        ["select", ..] => Err(PrepareError::SyntaxError),
        _ => Err(PrepareError::UnrecognizedStatement),
    }
}

/// Run a prepared statement, writing any selected rows to `out`.
pub fn execute_statement<S: Storage>(
    statement: Statement,
    table: &mut Table<S>,
    out: &mut impl Write,
) -> io::Result<ExecuteResult> {
    match statement {
        Statement::Insert(row) => match table.insert(row) {
            Ok(()) => Ok(ExecuteResult::Success),
            Err(e) => {
                tracing::warn!(reason = %e, "insert rejected");
                Ok(ExecuteResult::TableFull)
            }
        },
        Statement::Select => {
            for row in table.scan() {
                writeln!(out, "{row}")?;
            }
            Ok(ExecuteResult::Success)
        }
        Statement::SelectOne(id) => match table.find(id) {
            Some(row) => {
                writeln!(out, "{row}")?;
                Ok(ExecuteResult::Success)
            }
            None => Ok(ExecuteResult::NotFound),
        },
    }
}

/// A random row: a full name as the username and a matching address.
pub fn random_row<R: Rng + ?Sized>(id: u32, rng: &mut R) -> Row {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or_default();
    let last = LAST_NAMES.choose(rng).copied().unwrap_or_default();
    let domain = EMAIL_DOMAINS.choose(rng).copied().unwrap_or_default();

    let name = format!("{first} {last}");
    let email = format!("{}.{}@{domain}", first.to_lowercase(), last.to_lowercase());
    Row::new(id, &name, &email)
}

/// Insert `count` random rows with ids following the current largest id.
///
/// Returns `count`. If the table fills up or the ids run out first, the
/// error carries how many rows went in before that.
pub fn seed<S: Storage, R: Rng + ?Sized>(
    table: &mut Table<S>,
    count: u32,
    rng: &mut R,
) -> Result<u32, SeedError> {
    let start = match table.max_id() {
        Some(id) => id.checked_add(1),
        None => Some(0),
    };
    for inserted in 0..count {
        let Some(id) = start.and_then(|start| start.checked_add(inserted)) else {
            tracing::warn!(inserted, "seeding stopped, no ids left");
            return Err(SeedError {
                inserted,
                stop: SeedStop::IdsExhausted,
            });
        };
        if let Err(e) = table.insert(random_row(id, rng)) {
            tracing::warn!(inserted, reason = %e, "seeding stopped");
            return Err(SeedError {
                inserted,
                stop: SeedStop::Full(e),
            });
        }
    }
    tracing::info!(count, first_id = ?start, "seeded table");
    Ok(count)
}

/// Why seeding stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStop {
    /// The table turned a row away.
    Full(TableFull),
    /// The largest id is `u32::MAX`.
    IdsExhausted,
}

/// Seeding stopped after `inserted` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedError {
    pub inserted: u32,
    pub stop: SeedStop,
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stop {
            SeedStop::Full(e) => write!(f, "{e} after {} rows", self.inserted),
            SeedStop::IdsExhausted => write!(f, "no ids left after {} rows", self.inserted),
        }
    }
}

impl std::error::Error for SeedError {}

/// Read and execute commands until `.exit` or end of input.
pub fn run<S, R, W, G>(table: &mut Table<S>, mut input: R, out: &mut W, rng: &mut G) -> io::Result<()>
where
    S: Storage,
    R: BufRead,
    W: Write,
    G: Rng + ?Sized,
{
    let mut buffer = String::new();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            writeln!(out)?;
            return Ok(());
        }
        let line = buffer.trim();

        if line.starts_with('.') {
            match parse_meta_command(line) {
                Some(MetaCommand::Exit) => return Ok(()),
                Some(MetaCommand::BTree) => write!(out, "{}", table.tree().render())?,
                Some(MetaCommand::Seed(count)) => match seed(table, count, rng) {
                    Ok(count) => writeln!(out, "Seeded {count} rows.")?,
                    Err(e) => {
                        writeln!(out, "Seeded {} rows.", e.inserted)?;
                        match e.stop {
                            SeedStop::Full(_) => writeln!(out, "Error: Table full.")?,
                            SeedStop::IdsExhausted => writeln!(out, "Error: No ids left.")?,
                        }
                    }
                },
                None => writeln!(out, "Unrecognized command '{line}'")?,
            }
            continue;
        }

        match prepare_statement(line) {
            Ok(statement) => match execute_statement(statement, table, out)? {
                ExecuteResult::Success => writeln!(out, "Executed.")?,
                ExecuteResult::TableFull => writeln!(out, "Error: Table full.")?,
                ExecuteResult::NotFound => writeln!(out, "Not found.")?,
            },
            Err(PrepareError::UnrecognizedStatement) => {
                writeln!(out, "Unrecognized keyword at start of '{line}'.")?;
            }
            Err(PrepareError::SyntaxError) => {
                writeln!(out, "Syntax error. Could not parse statement.")?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::test_row;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn run_script(table: &mut Table<MemoryStorage>, script: &str) -> String {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(0);
        run(table, script.as_bytes(), &mut out, &mut rng).expect("run");
        String::from_utf8(out).expect("utf-8 output")
    }

    fn new_table(max_rows: usize) -> Table<MemoryStorage> {
        Table::open_with_store(MemoryStorage::new(), 3, max_rows).expect("open table")
    }

    /// Output lines with the prompts stripped.
    fn responses(output: &str) -> Vec<&str> {
        output
            .split(PROMPT)
            .flat_map(str::lines)
            .filter(|line| !line.is_empty())
            .collect()
    }

    #[test]
    fn test_prepare_insert() {
        assert_eq!(
            prepare_statement("insert 1 user1 person1@example.com"),
            Ok(Statement::Insert(Row::new(1, "user1", "person1@example.com")))
        );
        assert_eq!(
            prepare_statement("insert 1 user1"),
            Err(PrepareError::SyntaxError)
        );
        assert_eq!(
            prepare_statement("insert -1 user1 a@b.c"),
            Err(PrepareError::SyntaxError)
        );
        assert_eq!(
            prepare_statement("insert x user1 a@b.c"),
            Err(PrepareError::SyntaxError)
        );
    }

    #[test]
    fn test_prepare_select() {
        assert_eq!(prepare_statement("select"), Ok(Statement::Select));
        assert_eq!(prepare_statement("select 7"), Ok(Statement::SelectOne(7)));
        assert_eq!(
            prepare_statement("select 7 8"),
            Err(PrepareError::SyntaxError)
        );
        assert_eq!(
            prepare_statement("delete 7"),
            Err(PrepareError::UnrecognizedStatement)
        );
        assert_eq!(prepare_statement(""), Err(PrepareError::UnrecognizedStatement));
    }

    #[test]
    fn test_parse_meta_command() {
        assert_eq!(parse_meta_command(".exit"), Some(MetaCommand::Exit));
        assert_eq!(parse_meta_command(".btree"), Some(MetaCommand::BTree));
        assert_eq!(parse_meta_command(".seed"), Some(MetaCommand::Seed(10)));
        assert_eq!(parse_meta_command(".seed 25"), Some(MetaCommand::Seed(25)));
        assert_eq!(parse_meta_command(".seed many"), None);
        assert_eq!(parse_meta_command(".exit now"), None);
        assert_eq!(parse_meta_command(".tables"), None);
    }

    #[test]
    fn test_insert_and_select() {
        let mut table = new_table(100);
        let output = run_script(
            &mut table,
            "insert 2 user2 person2@example.com\n\
             insert 1 user1 person1@example.com\n\
             select\n\
             select 2\n\
             select 3\n\
             .exit\n",
        );

        assert_eq!(
            responses(&output),
            vec![
                "Executed.",
                "Executed.",
                "(1, user1, person1@example.com)",
                "(2, user2, person2@example.com)",
                "Executed.",
                "(2, user2, person2@example.com)",
                "Executed.",
                "Not found.",
            ]
        );
        assert!(output.starts_with(PROMPT));
    }

    #[test]
    fn test_error_messages() {
        let mut table = new_table(100);
        let output = run_script(&mut table, "update foo\n.tables\ninsert 1\n");

        assert_eq!(
            responses(&output),
            vec![
                "Unrecognized keyword at start of 'update foo'.",
                "Unrecognized command '.tables'",
                "Syntax error. Could not parse statement.",
            ]
        );
    }

    #[test]
    fn test_table_full_message() {
        let mut table = new_table(1);
        let output = run_script(&mut table, "insert 1 a a@x.com\ninsert 2 b b@x.com\n");

        assert_eq!(responses(&output), vec!["Executed.", "Error: Table full."]);
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn test_exit_stops_reading() {
        let mut table = new_table(100);
        let output = run_script(&mut table, ".exit\ninsert 1 a a@x.com\n");

        assert_eq!(output, PROMPT);
        assert_eq!(table.num_rows(), 0);
    }

    #[test]
    fn test_end_of_input_exits() {
        let mut table = new_table(100);
        let output = run_script(&mut table, "insert 1 a a@x.com");

        assert_eq!(output, format!("{PROMPT}Executed.\n{PROMPT}\n"));
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn test_btree_command() {
        let mut table = new_table(100);
        let mut script = String::new();
        for id in 0..6 {
            script.push_str(&format!("insert {id} u{id} u{id}@x.com\n"));
        }
        script.push_str(".btree\n");

        let output = run_script(&mut table, &script);
        assert!(output.contains("ROOT: 2\n  L: 0 1\n  R: 2 3 4 5\n"));
    }

    #[test]
    fn test_seed_continues_after_largest_id() {
        let mut table = new_table(100);
        let output = run_script(&mut table, "insert 41 a a@x.com\n.seed 5\n");

        assert!(output.contains("Seeded 5 rows."));
        let ids: Vec<u32> = table.scan().map(|row| row.id).collect();
        assert_eq!(ids, vec![41, 42, 43, 44, 45, 46]);

        let seeded = table.find(42).expect("seeded row");
        assert!(seeded.username.contains(' '));
        assert!(seeded.email.contains('@'));
    }

    #[test]
    fn test_seed_stops_when_full() {
        let mut table = new_table(3);
        let output = run_script(&mut table, ".seed 10\n");

        assert_eq!(responses(&output), vec!["Seeded 3 rows.", "Error: Table full."]);
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn test_seed_reports_rows_inserted_before_full() {
        let mut table = new_table(4);
        table.insert(test_row(7)).expect("insert");

        let result = seed(&mut table, 10, &mut StdRng::seed_from_u64(1));
        assert_eq!(
            result,
            Err(SeedError {
                inserted: 3,
                stop: SeedStop::Full(TableFull::RowLimit { max_rows: 4 }),
            })
        );
        let ids: Vec<u32> = table.scan().map(|row| row.id).collect();
        assert_eq!(ids, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_seed_stops_when_ids_run_out() {
        let mut table = new_table(100);
        table.insert(test_row(u32::MAX - 2)).expect("insert");

        let result = seed(&mut table, 5, &mut StdRng::seed_from_u64(1));
        assert_eq!(
            result,
            Err(SeedError {
                inserted: 2,
                stop: SeedStop::IdsExhausted,
            })
        );
        let ids: Vec<u32> = table.scan().map(|row| row.id).collect();
        assert_eq!(ids, vec![u32::MAX - 2, u32::MAX - 1, u32::MAX]);

        let output = run_script(&mut table, ".seed 3\n");
        assert_eq!(responses(&output), vec!["Seeded 0 rows.", "Error: No ids left."]);
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn test_random_rows_are_deterministic_per_seed() {
        let a = random_row(1, &mut StdRng::seed_from_u64(9));
        let b = random_row(1, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);

        let name = a.username.to_lowercase().replace(' ', ".");
        assert!(a.email.starts_with(&format!("{name}@")));
    }
}
