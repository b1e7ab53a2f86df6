//! Line-oriented command loop.
//!
//! Every command starts with `#`; output lines carry a bracketed tag so the
//! console can be driven by scripts.

use crate::prompt::{stdin_input, Input, StdinPrompter};
use saga_core::{
    get_inheritable_attribute, inheritable_items, load_snapshot, meets_prerequisites,
    resolve_choices, resolve_expression, AttributeQuery, Catalog, ChoiceContext, Entity,
    EntityType, ReduceMode, RulesConfig, SnapshotError, StandardCatalog, Value,
};
use std::io::{self, Write};

/// Console startup options.
#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    pub snapshot: Option<String>,
    pub rules: RulesConfig,
}

/// Parse options from command line arguments.
pub fn parse_options_from_args(args: &[String], rules: RulesConfig) -> ConsoleOptions {
    let mut options = ConsoleOptions {
        snapshot: None,
        rules,
    };

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--strict" => options.rules = options.rules.with_strict_prerequisites(true),
            "--disabled" => options.rules = options.rules.with_include_disabled(true),
            other if !other.starts_with("--") => options.snapshot = Some(other.to_string()),
            other => eprintln!("Ignoring unknown option {other}"),
        }
    }
    options
}

struct Console {
    actor: Entity,
    catalog: StandardCatalog,
    rules: RulesConfig,
    input: Input,
}

/// Run the command loop until `#quit` or end of input.
pub async fn run_headless(options: ConsoleOptions) -> Result<(), SnapshotError> {
    let actor = match &options.snapshot {
        Some(path) => load_snapshot(path).await?,
        None => Entity::character("Unnamed"),
    };

    let mut console = Console {
        actor,
        catalog: StandardCatalog::new(),
        rules: options.rules,
        input: stdin_input(),
    };

    println!("=== Saga Rules Console ===");
    console.print_status();
    println!();
    print_commands();
    println!();

    let mut stdout = io::stdout();
    loop {
        let line = match next_line(&console.input).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(command) = line.strip_prefix('#') else {
            println!("[ERROR] Commands start with '#'. Type #help for help.");
            continue;
        };
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));

        match name {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "expr" => console.expression(rest),
            "attr" => console.attribute(rest),
            "prereq" => console.prerequisite(rest),
            "inherit" => console.inherit(),
            "choose" => console.choose(rest).await,
            "load" => console.load(rest).await,
            "status" => console.print_status(),
            "help" => {
                println!("[HELP]");
                print_commands();
            }
            _ => println!("[ERROR] Unknown command. Type #help for help."),
        }
        stdout.flush().ok();
    }

    Ok(())
}

async fn next_line(input: &Input) -> io::Result<Option<String>> {
    let mut lines = input.lock().await;
    lines.next_line().await
}

fn print_commands() {
    println!("Commands:");
    println!("  #expr <expression>      - Evaluate against the actor's variables");
    println!("  #attr <keys> [REDUCE]   - Aggregate attribute(s), comma separated");
    println!("  #prereq <item name>     - Check an owned or catalog item's prerequisites");
    println!("  #inherit                - List inheritable items");
    println!("  #choose <item name>     - Resolve an item's choices and add it");
    println!("  #load <path>            - Load another snapshot");
    println!("  #status                 - Show the loaded actor");
    println!("  #help                   - Show this help");
    println!("  #quit                   - Exit");
}

impl Console {
    fn print_status(&self) {
        println!(
            "[STATUS] {} ({}), {} items, {} inheritable",
            self.actor.name,
            self.actor.kind,
            self.actor.items.len(),
            inheritable_items(&self.actor).len()
        );
    }

    fn expression(&self, expr: &str) {
        if expr.is_empty() {
            println!("[ERROR] Usage: #expr <expression>");
            return;
        }
        let value = resolve_expression(&Value::from(expr), &self.actor);
        println!("[VALUE] {value}");
    }

    fn attribute(&self, args: &str) {
        let mut parts = args.split_whitespace();
        let Some(keys) = parts.next() else {
            println!("[ERROR] Usage: #attr <keys> [REDUCE]");
            return;
        };
        let reduce = match parts.next().map(str::parse::<ReduceMode>) {
            None => ReduceMode::Sum,
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                println!("[ERROR] {e}");
                return;
            }
        };

        let keys: Vec<&str> = keys.split(',').filter(|k| !k.is_empty()).collect();
        let query = match keys.as_slice() {
            [single] => AttributeQuery::new(*single),
            many => AttributeQuery::keys(many.iter().copied()),
        }
        .reduce(reduce)
        .flags(self.rules.attribute_flags());

        println!("[ATTR] {}", get_inheritable_attribute(&self.actor, &query));
    }

    /// An owned item by name, else a catalog feat or talent.
    fn lookup(&self, name: &str) -> Option<Entity> {
        self.actor.find_item(name).cloned().or_else(|| {
            [EntityType::Feat, EntityType::Talent]
                .iter()
                .find_map(|kind| self.catalog.find(name, kind))
        })
    }

    fn prerequisite(&self, name: &str) {
        if name.is_empty() {
            println!("[ERROR] Usage: #prereq <item name>");
            return;
        }
        let Some(item) = self.lookup(name) else {
            println!("[ERROR] No item named '{name}'");
            return;
        };

        let options = self.rules.prerequisite_options().with_is_add(true);
        let result = meets_prerequisites(Some(&self.actor), item.prerequisite(), &options);
        if result.passes() {
            println!("[PASS] {}", item.name);
        } else {
            println!("[FAIL] {}", item.name);
        }
        for message in result.failure_messages() {
            println!("  {message}");
        }
    }

    fn inherit(&self) {
        println!("[INHERIT]");
        for item in inheritable_items(&self.actor) {
            println!("  {} ({})", item.name, item.kind);
        }
    }

    async fn choose(&mut self, name: &str) {
        if name.is_empty() {
            println!("[ERROR] Usage: #choose <item name>");
            return;
        }
        let Some(item) = self.lookup(name) else {
            println!("[ERROR] No item named '{name}'");
            return;
        };

        let result = {
            let prompter = StdinPrompter::new(self.input.clone());
            let ctx = ChoiceContext::new(&self.catalog, &prompter)
                .with_actor(&self.actor)
                .with_strict(self.rules.strict_prerequisites);
            resolve_choices(&item, &ctx).await
        };

        match result {
            Ok(resolved) => {
                for selection in &resolved.selections {
                    println!("[CHOSEN] {}: {}", selection.choice, selection.option);
                }
                for provided in &resolved.provided_items {
                    println!("[PROVIDES] {} ({})", provided.name, provided.kind);
                }
                println!("[ADDED] {}", resolved.item.name);
                self.actor.items.push(resolved.item);
            }
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    async fn load(&mut self, path: &str) {
        if path.is_empty() {
            println!("[ERROR] Usage: #load <path>");
            return;
        }
        match load_snapshot(path).await {
            Ok(actor) => {
                self.actor = actor;
                println!("[LOADED] Snapshot loaded from {path}");
                self.print_status();
            }
            Err(e) => println!("[ERROR] Load failed: {e}"),
        }
    }
}
