pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_memories.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_memories.sql")),
				"tables/002_cache.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_cache.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
