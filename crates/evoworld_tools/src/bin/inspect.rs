use clap::Parser;
use evoworld_core::{Archive, MemoryArchive, WORLD_OBJECT_TYPE};
use evoworld_io::{load_checkpoint, read_checkpoint_header, CheckpointHeader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize an evoworld checkpoint", long_about = None)]
struct Args {
    /// Checkpoint file to inspect
    input: String,

    /// Dump the full world archive as pretty JSON
    #[arg(long)]
    json: bool,

    /// Only read the header; skip the digest check
    #[arg(long)]
    header_only: bool,
}

fn print_header(header: &CheckpointHeader) {
    println!("Format:    {} v{}", header.format, header.format_version);
    println!("Run:       {}", header.run_id);
    println!("Update:    {}", header.update);
    println!("Created:   {}", header.created_at);
    println!("Digest:    {}", header.digest);
    if !header.failed.is_empty() {
        println!("Missing:   {}", header.failed.join(", "));
    }
}

fn summarize(archive: &MemoryArchive) -> Vec<String> {
    let world: &dyn Archive = archive;
    let mut lines = Vec::new();
    let order: Vec<String> = (0..)
        .map_while(|i| {
            world
                .property(&format!("order.{i}"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .collect();
    lines.push(format!("Update order: {}", order.join(" -> ")));
    for id in world.sub_object_ids() {
        if let Some(facet) = world.sub_object(&id) {
            lines.push(format!(
                "  {:<16} {:<24} v{} ({} properties, {} sub-objects)",
                id,
                facet.object_type(),
                facet.version(),
                facet.property_ids().len(),
                facet.sub_object_ids().len()
            ));
        }
    }
    lines
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.header_only {
        print_header(&read_checkpoint_header(&args.input)?);
        return Ok(());
    }

    let (header, archive) = load_checkpoint(&args.input)?;
    print_header(&header);
    anyhow::ensure!(
        archive.object_type() == WORLD_OBJECT_TYPE,
        "archive is `{}`, not a world",
        archive.object_type()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&archive)?);
    } else {
        println!();
        for line in summarize(&archive) {
            println!("{line}");
        }
    }
    Ok(())
}
