use dispatch_tool::{
    AllocationEngine, AllocationResult, AssignmentLedger, CatalogSnapshot, DispatchConfig,
    DispatchStore, ReleaseCoordinator, ReleaseSummary, Resource, ResourceCategory, ResourceId,
    ResourceQuery, ResourceRequirement, ResourceStats, ResourceStatus, ResourceStore,
    default_catalog, load_catalog_from_csv, load_catalog_from_json, open_store,
    save_catalog_to_csv, save_catalog_to_json, seed_catalog,
};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Runtime;

struct Session {
    runtime: Runtime,
    store: Arc<dyn DispatchStore>,
    engine: AllocationEngine<dyn DispatchStore>,
    releases: ReleaseCoordinator<dyn DispatchStore>,
}

fn parse_id_list(s: &str) -> Vec<ResourceId> {
    s.split(',')
        .filter_map(|p| p.trim().parse::<ResourceId>().ok())
        .collect()
}

fn render_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for (ci, cell) in cells.enumerate() {
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(widths[ci].saturating_sub(cell.len())));
        line.push_str(" |");
    }
    line
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (ci, cell) in row.iter().enumerate() {
            if cell.len() > widths[ci] {
                widths[ci] = cell.len();
            }
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&widths, headers.iter().copied()));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in rows {
        out.push_str(&render_row(&widths, row.iter().map(String::as_str)));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out
}

fn render_resources(resources: &[Resource]) -> String {
    let rows: Vec<Vec<String>> = resources
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.identifier.clone(),
                r.name.clone(),
                r.resource_type.name.clone(),
                r.category().to_string(),
                r.status.to_string(),
                r.assigned_to_conversation_id.clone().unwrap_or_default(),
            ]
        })
        .collect();
    render_text_table(
        &["id", "identifier", "name", "type", "category", "status", "incident"],
        &rows,
    )
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  seed                               Load the built-in catalog\n  list [available|<CATEGORY>]        List resources\n  show <id>                          Show one resource\n  assign <id> <incident>             Assign one resource to an incident\n  assign-type <count> <incident> <type...>\n                                     Assign oldest available units matching a type\n  assign-near <lat> <lng> <incident> [CATEGORY] [type] [count] [max_km]\n                                     Assign closest units (default bundle without a requirement)\n  release <incident> <ids_csv>       Release resources from an incident\n  release-all <incident>             Release everything bound to an incident\n  deploy <id> <incident>             Mark an assigned resource in use\n  status <id> <STATUS>               Set AVAILABLE, MAINTENANCE or OUT_OF_SERVICE\n  history <id>                       Show assignment history of a resource\n  stats                              Show fleet counts\n  save <json|csv> <path>             Export the catalog\n  load <json|csv> <path>             Import a catalog\n  quit|exit                          Exit"
    );
}

fn print_allocation(result: &AllocationResult) {
    if result.assigned_resources.is_empty() {
        println!("No resources assigned.");
    } else {
        println!(
            "Assigned {} resource(s), total distance {:.2} km.",
            result.assigned_resources.len(),
            result.total_distance_km
        );
        for assigned in &result.assigned_resources {
            match assigned.distance_km {
                Some(d) => println!(
                    "  #{} {} ({:.2} km)",
                    assigned.resource.id, assigned.resource.name, d
                ),
                None => println!("  #{} {}", assigned.resource.id, assigned.resource.name),
            }
        }
    }
    for shortfall in &result.unavailable_requirements {
        println!("Unavailable: {shortfall}");
    }
}

fn print_release(summary: &ReleaseSummary) {
    println!(
        "Released {} resource(s), {} assignment(s) completed.",
        summary.released_count(),
        summary.completed_assignments
    );
    for failure in &summary.failures {
        println!("  #{}: {}", failure.resource_id, failure.reason);
    }
}

fn print_stats(stats: &ResourceStats) {
    println!("Total          : {}", stats.total);
    println!("Available      : {}", stats.available);
    println!("Assigned       : {}", stats.assigned);
    println!("In use         : {}", stats.in_use);
    println!("Maintenance    : {}", stats.maintenance);
    println!("Out of service : {}", stats.out_of_service);
    println!("Utilization    : {:.1}%", stats.utilization_percent());
    for (category, counts) in &stats.by_category {
        println!(
            "  {:<10} total {:>3}  available {:>3}  committed {:>3}",
            category.as_str(),
            counts.total,
            counts.available,
            counts.committed
        );
    }
}

fn parse_requirement(args: &[&str]) -> Result<Option<ResourceRequirement>, String> {
    let Some(category) = args.first() else {
        return Ok(None);
    };
    let category = ResourceCategory::from_str(category).map_err(|e| e.to_string())?;
    let mut requirement = ResourceRequirement::of_category(category);
    if let Some(type_hint) = args.get(1) {
        requirement = requirement.with_type(*type_hint);
    }
    if let Some(count) = args.get(2) {
        requirement = requirement.with_count(count.parse().map_err(|_| "Invalid count")?);
    }
    if let Some(max_km) = args.get(3) {
        requirement = requirement.within_km(max_km.parse().map_err(|_| "Invalid max_km")?);
    }
    Ok(Some(requirement))
}

fn load_snapshot(format: &str, path: &str) -> Result<CatalogSnapshot, String> {
    match format {
        "json" => load_catalog_from_json(path).map_err(|e| e.to_string()),
        "csv" => load_catalog_from_csv(path).map_err(|e| e.to_string()),
        _ => Err("Usage: load <json|csv> <path>".to_string()),
    }
}

impl Session {
    fn open(config: &DispatchConfig) -> Result<Self, String> {
        let runtime = Runtime::new().map_err(|e| e.to_string())?;
        let store = open_store(config.database_path.as_deref()).map_err(|e| e.to_string())?;
        Ok(Self {
            runtime,
            engine: AllocationEngine::with_config(Arc::clone(&store), config.allocation_config()),
            releases: ReleaseCoordinator::new(Arc::clone(&store)),
            store,
        })
    }

    fn store(&self) -> &dyn DispatchStore {
        self.store.as_ref()
    }

    fn list(&self, filter: Option<&str>) {
        let query = match filter {
            None => ResourceQuery::default(),
            Some(f) if f.eq_ignore_ascii_case("available") => ResourceQuery {
                status: Some(ResourceStatus::Available),
                ..ResourceQuery::default()
            },
            Some(f) => match ResourceCategory::from_str(f) {
                Ok(category) => ResourceQuery {
                    category: Some(category),
                    ..ResourceQuery::default()
                },
                Err(e) => {
                    println!("Error: {e}");
                    return;
                }
            },
        };
        match self.runtime.block_on(self.store().list_resources(&query)) {
            Ok(resources) if resources.is_empty() => println!("No resources."),
            Ok(resources) => println!("{}", render_resources(&resources)),
            Err(e) => println!("Error: {e}"),
        }
    }

    fn show(&self, id: ResourceId) {
        match self.runtime.block_on(self.store().get_resource(id)) {
            Ok(r) => {
                println!("Id         : {}", r.id);
                println!("Identifier : {}", r.identifier);
                println!("Name       : {}", r.name);
                println!("Type       : {} ({})", r.resource_type.name, r.category());
                println!("Status     : {}", r.status);
                println!("Capacity   : {}", r.capacity);
                println!(
                    "Location   : {}",
                    if r.location.is_empty() { "-" } else { r.location.as_str() }
                );
                match r.coordinates() {
                    Some(c) => println!("Coordinates: {:.4}, {:.4}", c.latitude, c.longitude),
                    None => println!("Coordinates: -"),
                }
                if let Some(incident) = &r.assigned_to_conversation_id {
                    println!("Incident   : {incident}");
                }
            }
            Err(e) => println!("Error: {e}"),
        }
    }

    fn history(&self, id: ResourceId) {
        match self.runtime.block_on(self.store().assignments_for_resource(id)) {
            Ok(entries) if entries.is_empty() => println!("No assignments for resource {id}."),
            Ok(entries) => {
                let rows: Vec<Vec<String>> = entries
                    .iter()
                    .map(|a| {
                        vec![
                            a.id.to_string(),
                            a.conversation_id.clone(),
                            a.status.to_string(),
                            a.assigned_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                            a.completed_at
                                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                                .unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    render_text_table(
                        &["id", "incident", "status", "assigned_at", "completed_at"],
                        &rows
                    )
                );
            }
            Err(e) => println!("Error: {e}"),
        }
    }
}

fn main() {
    let config = match DispatchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    config.init_tracing();
    let session = match Session::open(&config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Could not open store: {e}");
            std::process::exit(1);
        }
    };

    println!("Dispatch Tool (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts[0];
        let args = &parts[1..];

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "seed" => match session
                .runtime
                .block_on(seed_catalog(session.store(), &default_catalog()))
            {
                Ok(summary) => println!(
                    "Seeded {} types and {} resources ({} skipped).",
                    summary.types_created, summary.resources_created, summary.skipped
                ),
                Err(e) => println!("Error: {e}"),
            },
            "list" => session.list(args.first().copied()),
            "show" => match args.first().map(|s| s.parse::<ResourceId>()) {
                Some(Ok(id)) => session.show(id),
                Some(Err(_)) => println!("Invalid id"),
                None => println!("Usage: show <id>"),
            },
            "history" => match args.first().map(|s| s.parse::<ResourceId>()) {
                Some(Ok(id)) => session.history(id),
                Some(Err(_)) => println!("Invalid id"),
                None => println!("Usage: history <id>"),
            },
            "assign" => match args {
                [id_s, incident] => {
                    let Ok(id) = id_s.parse::<ResourceId>() else {
                        println!("Invalid id");
                        continue;
                    };
                    match session
                        .runtime
                        .block_on(session.engine.assign_resource(id, incident, Some("cli")))
                    {
                        Ok(assigned) => println!(
                            "Assigned {} (#{}) to {}.",
                            assigned.resource.name, assigned.resource.id, incident
                        ),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: assign <id> <incident>"),
            },
            "assign-type" => match args {
                [count_s, incident, hint @ ..] if !hint.is_empty() => {
                    let Ok(count) = count_s.parse::<usize>() else {
                        println!("Invalid count");
                        continue;
                    };
                    let hint = hint.join(" ");
                    match session
                        .runtime
                        .block_on(session.engine.assign_by_type(&hint, count, incident, None))
                    {
                        Ok(assigned) => {
                            println!("Assigned {} of {} requested.", assigned.len(), count);
                            for a in &assigned {
                                println!("  #{} {}", a.resource.id, a.resource.name);
                            }
                        }
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: assign-type <count> <incident> <type...>"),
            },
            "assign-near" => match args {
                [lat_s, lng_s, incident, rest @ ..] => {
                    let (Ok(lat), Ok(lng)) = (lat_s.parse::<f64>(), lng_s.parse::<f64>()) else {
                        println!("Invalid coordinates");
                        continue;
                    };
                    let requirements = match parse_requirement(rest) {
                        Ok(requirement) => requirement.into_iter().collect::<Vec<_>>(),
                        Err(e) => {
                            println!("Error: {e}");
                            continue;
                        }
                    };
                    let coordinates = match dispatch_tool::Coordinates::new(lat, lng) {
                        Ok(c) => c,
                        Err(e) => {
                            println!("Error: {e}");
                            continue;
                        }
                    };
                    match session.runtime.block_on(session.engine.assign_nearest(
                        coordinates,
                        incident,
                        &requirements,
                        Some("cli"),
                    )) {
                        Ok(result) => print_allocation(&result),
                        Err(e) => {
                            if let Some(partial) = e.partial() {
                                print_allocation(partial);
                            }
                            println!("Error: {e}");
                        }
                    }
                }
                _ => println!(
                    "Usage: assign-near <lat> <lng> <incident> [CATEGORY] [type] [count] [max_km]"
                ),
            },
            "release" => match args {
                [incident, ids] => {
                    let ids = parse_id_list(ids);
                    match session.runtime.block_on(session.releases.release(&ids, incident)) {
                        Ok(summary) => print_release(&summary),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: release <incident> <ids_csv>"),
            },
            "release-all" => match args {
                [incident] => match session
                    .runtime
                    .block_on(session.releases.release_all_for_incident(incident))
                {
                    Ok(summary) => print_release(&summary),
                    Err(e) => println!("Error: {e}"),
                },
                _ => println!("Usage: release-all <incident>"),
            },
            "deploy" => match args {
                [id_s, incident] => {
                    let Ok(id) = id_s.parse::<ResourceId>() else {
                        println!("Invalid id");
                        continue;
                    };
                    match session.runtime.block_on(session.releases.deploy(id, incident)) {
                        Ok(resource) => println!("Deployed {} (#{}).", resource.name, resource.id),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: deploy <id> <incident>"),
            },
            "status" => match args {
                [id_s, status_s] => {
                    let Ok(id) = id_s.parse::<ResourceId>() else {
                        println!("Invalid id");
                        continue;
                    };
                    let status = match ResourceStatus::from_str(status_s) {
                        Ok(status) => status,
                        Err(e) => {
                            println!("Error: {e}");
                            continue;
                        }
                    };
                    match session.runtime.block_on(session.store().set_status(id, status)) {
                        Ok(resource) => {
                            println!("Status of #{} set to {}.", resource.id, resource.status)
                        }
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: status <id> <STATUS>"),
            },
            "stats" => match session
                .runtime
                .block_on(ResourceStats::collect(session.store()))
            {
                Ok(stats) => print_stats(&stats),
                Err(e) => println!("Error: {e}"),
            },
            "save" => match args {
                [format, path] => {
                    let snapshot =
                        match session.runtime.block_on(CatalogSnapshot::from_store(session.store())) {
                            Ok(snapshot) => snapshot,
                            Err(e) => {
                                println!("Error: {e}");
                                continue;
                            }
                        };
                    let saved = match *format {
                        "json" => save_catalog_to_json(&snapshot, path),
                        "csv" => save_catalog_to_csv(&snapshot, path),
                        _ => {
                            println!("Usage: save <json|csv> <path>");
                            continue;
                        }
                    };
                    match saved {
                        Ok(_) => println!("Catalog saved to {path}."),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: save <json|csv> <path>"),
            },
            "load" => match args {
                [format, path] => {
                    let snapshot = match load_snapshot(format, path) {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            println!("Error: {e}");
                            continue;
                        }
                    };
                    match session.runtime.block_on(seed_catalog(session.store(), &snapshot)) {
                        Ok(summary) => println!(
                            "Catalog loaded from {path} ({} types, {} resources, {} skipped).",
                            summary.types_created, summary.resources_created, summary.skipped
                        ),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                _ => println!("Usage: load <json|csv> <path>"),
            },
            _ => println!("Unknown command. Type 'help'."),
        }
    }
}
