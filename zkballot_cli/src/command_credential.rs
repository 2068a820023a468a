use log::warn;

pub fn command_credential(matches: &clap::ArgMatches) {
    let identity = match matches.value_of("IDENTITY") {
        Some(identity) => crate::expand(identity),
        None => crate::exit_with("credential", "identity required"),
    };

    let credential = zkballot::issue_credentials(&identity);
    warn!("the credential contains the voter secret, keep it on the voter's device");
    crate::print_json("credential", &credential);
}
