use zkballot::{EligibilityTree, ProtocolConfig};

pub fn command_eligibility(matches: &clap::ArgMatches, config: &ProtocolConfig) {
    let filename = crate::expand(matches.value_of("VOTERS").unwrap_or_default());
    let contents = std::fs::read_to_string(&filename).unwrap_or_else(|e| {
        crate::exit_with("eligibility", format!("unable to read {}: {}", filename, e))
    });

    let voters: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let tree = EligibilityTree::build(&voters, config.tree_depth)
        .unwrap_or_else(|e| crate::exit_with("eligibility", e));

    match matches.value_of("prove") {
        None => {
            println!("voters: {}", tree.len());
            println!("depth: {}", tree.depth());
            println!("root: {}", tree.root());
        }
        Some(identity) => {
            let identity = crate::expand(identity);
            let proof = tree
                .position(identity.as_bytes())
                .and_then(|index| tree.prove_membership(index))
                .unwrap_or_else(|| {
                    crate::exit_with("eligibility", format!("{} is not an eligible voter", identity))
                });
            crate::print_json("eligibility", &proof);
        }
    }
}
