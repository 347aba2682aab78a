//! Guide module for the help text printed by `mikado guide`
//!
//! The guide is assembled from sections so that the command reference can use
//! the configured environment variable names.

const SERVER_ENV: &str = "MIKADO_SERVER";
const DB_ENV: &str = "MIKADO_DB";

/// Generate the full guide string
pub fn get_guide_string() -> String {
    format!(
        r#"=== MIKADO GUIDE ===

{overview}

{getting_started}

{workflow_guide}

{command_reference}

{best_practices}"#,
        overview = get_overview_section(),
        getting_started = get_getting_started_section(),
        workflow_guide = get_workflow_section(),
        command_reference = get_command_reference_section(),
        best_practices = get_best_practices_section(),
    )
}

fn get_overview_section() -> &'static str {
    r#"== OVERVIEW ==

Mikado tracks a goal together with everything that stands in its way. Goals
form a tree of subgoals, and any goal may additionally be blocked by others.
A goal is "switchable" when it can be closed (or reopened) right now: all of
its subgoals and blockers are closed, and nothing closed depends on it.

Work on switchable goals first. When a change turns out to need something
else, add that something as a subgoal or blocker and continue there."#
}

fn get_getting_started_section() -> String {
    format!(
        r#"== GETTING STARTED ==

1. START A SERVER:
   $ mikado serve --db ./goals --root-name "Ship the feature"
   Goals are kept in the given directory (or ${DB_ENV}). Without --db they
   live in memory until the server stops.

2. POINT THE CLI AT IT:
   The CLI talks to http://localhost:3000 by default. Use --server or
   ${SERVER_ENV} to choose another address.

3. LOOK AROUND:
   $ mikado show"#
    )
}

fn get_workflow_section() -> &'static str {
    r#"== WORKFLOW ==

1. BREAK THE GOAL DOWN
   $ mikado add "Extract the parser"        (subgoal of the selection)
   $ mikado select 2
   $ mikado add "Write parser tests"

2. RECORD DEPENDENCIES
   Select the blocked goal, hold it, select the blocker and link:
   $ mikado select 3 && mikado hold && mikado select 4 && mikado link

3. CLOSE WHAT IS SWITCHABLE
   Switchable goals are shown in green.
   $ mikado close 4

4. FOCUS
   $ mikado zoom 2             (hide everything outside goal 2)
   $ mikado open-view          (hide closed goals)
   $ mikado filter parser      (only goals containing "parser")"#
}

fn get_command_reference_section() -> String {
    format!(
        r#"== COMMAND REFERENCE ==

Goal numbers are the ones printed by `mikado show`. Commands that take a goal
default to the selection (*); link and insert default their lower goal to the
previous selection (+).

GLOBAL FLAGS:
  --server=<url>                       Server URL (env {SERVER_ENV})

GOALS:
  $ mikado add "<name>" [-u <goal>] [-e parent|blocker|relation]
  $ mikado insert "<name>" [-l <lower>] [-u <upper>]
  $ mikado rename "<name>" [-g <goal>]
  $ mikado close [<goal>]              Close or reopen a goal
  $ mikado delete [<goal>]             Delete a goal and its subgoals
  $ mikado link [-l <lower>] [-u <upper>] [-e blocker|parent|relation]
  $ mikado select <goal>
  $ mikado hold                        Keep the selection as previous selection
  $ mikado autolink "<keyword>" [-g <goal>]
                                       New goals containing the keyword are
                                       related to the goal automatically

VIEWS:
  $ mikado zoom [<goal>]               Zoom in, or out when already zoomed
  $ mikado filter [<pattern>]          Filter by name; no pattern clears it
  $ mikado open-view                   Toggle hiding of closed goals
  $ mikado progress                    Toggle closed/total annotations
  $ mikado switchable                  Toggle showing only switchable goals
  $ mikado show

DATA:
  $ mikado stats
  $ mikado export [-o <file>]
  $ mikado import <file>               Replace all goals with a snapshot

SERVER & UTILITIES:
  $ mikado serve [--port <port>] [--db <dir>] [--root-name "<name>"]
  $ mikado guide
  $ mikado completions <shell>"#
    )
}

fn get_best_practices_section() -> &'static str {
    r#"== BEST PRACTICES ==

• Keep goal names short; they are matched by filters and autolink keywords.
• Prefer blockers over deep subgoal chains when the order matters but the
  hierarchy does not.
• Close goals as soon as they are done so the next switchable one shows up.
• Export a snapshot before large reorganizations."#
}
