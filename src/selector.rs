use crate::taxonomy::AreaNode;

/// One "pick a child" dropdown in the area cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaLevel {
    pub options: Vec<AreaNode>,
    pub selected: Option<usize>,
}

impl AreaLevel {
    fn new(options: Vec<AreaNode>) -> Self {
        Self {
            options,
            selected: None,
        }
    }

    pub fn selected_node(&self) -> Option<&AreaNode> {
        self.selected.and_then(|index| self.options.get(index))
    }
}

/// Cascading area selection over an immutable taxonomy. Level 0 always
/// offers the taxonomy roots; each selected node with children opens one
/// more level below it.
#[derive(Debug, Clone)]
pub struct AreaSelector {
    roots: Vec<AreaNode>,
    levels: Vec<AreaLevel>,
}

impl AreaSelector {
    pub fn new(roots: Vec<AreaNode>) -> Self {
        let levels = vec![AreaLevel::new(roots.clone())];
        Self { roots, levels }
    }

    pub fn roots(&self) -> &[AreaNode] {
        &self.roots
    }

    pub fn levels(&self) -> &[AreaLevel] {
        &self.levels
    }

    /// Interactive selection of `option` at `level`. Drops every level below
    /// it and opens the selected node's children as a fresh level.
    pub fn select(&mut self, level: usize, option: usize) -> Result<(), String> {
        let options_len = self
            .levels
            .get(level)
            .map(|entry| entry.options.len())
            .ok_or_else(|| format!("area level {} does not exist", level + 1))?;
        if option >= options_len {
            return Err(format!("area option {} does not exist", option + 1));
        }

        self.levels.truncate(level + 1);
        self.levels[level].selected = Some(option);
        self.open_children_of_last();
        Ok(())
    }

    /// Rebuilds the cascade from stored names. Exact name matches only;
    /// the first unmatched name ends the restore.
    pub fn restore(&mut self, selections: &[String]) {
        self.clear();

        for (depth, name) in selections.iter().enumerate() {
            let Some(level) = self.levels.get_mut(depth) else {
                break;
            };
            let Some(index) = level.options.iter().position(|node| &node.name == name) else {
                break;
            };

            level.selected = Some(index);
            if !self.open_children_of_last() {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.levels = vec![AreaLevel::new(self.roots.clone())];
    }

    /// Names of the selected nodes from the root down, stopping at the first
    /// level without a selection.
    pub fn selections(&self) -> Vec<String> {
        self.levels
            .iter()
            .map_while(|level| level.selected_node())
            .map(|node| node.name.clone())
            .collect()
    }

    fn open_children_of_last(&mut self) -> bool {
        let children = self
            .levels
            .last()
            .and_then(AreaLevel::selected_node)
            .filter(|node| node.has_children())
            .map(|node| node.children.clone());

        match children {
            Some(children) => {
                self.levels.push(AreaLevel::new(children));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AreaSelector;
    use crate::taxonomy::parse_taxonomy;

    fn selector() -> AreaSelector {
        AreaSelector::new(parse_taxonomy(
            "Web|Auth|Login\nWeb|Auth|Logout\nWeb|Profile\nAPI|REST|GET\nAPI|GraphQL",
        ))
    }

    fn option_names(selector: &AreaSelector, level: usize) -> Vec<String> {
        selector.levels()[level]
            .options
            .iter()
            .map(|node| node.name.clone())
            .collect()
    }

    #[test]
    fn starts_with_root_level() {
        let selector = selector();
        assert_eq!(selector.levels().len(), 1);
        assert_eq!(option_names(&selector, 0), vec!["Web", "API"]);
        assert!(selector.selections().is_empty());
    }

    #[test]
    fn selecting_opens_children_level() {
        let mut selector = selector();
        selector.select(0, 0).expect("select web");
        assert_eq!(selector.levels().len(), 2);
        assert_eq!(option_names(&selector, 1), vec!["Auth", "Profile"]);
        assert_eq!(selector.levels()[1].selected, None);
        assert_eq!(selector.selections(), vec!["Web"]);
    }

    #[test]
    fn reselecting_truncates_deeper_levels() {
        let mut selector = selector();
        selector.select(0, 0).expect("web");
        selector.select(1, 0).expect("auth");
        selector.select(2, 1).expect("logout");
        assert_eq!(selector.selections(), vec!["Web", "Auth", "Logout"]);
        assert_eq!(selector.levels().len(), 3);

        selector.select(1, 1).expect("profile");
        assert_eq!(selector.levels().len(), 2);
        assert_eq!(selector.selections(), vec!["Web", "Profile"]);

        selector.select(1, 0).expect("auth again");
        assert_eq!(selector.levels().len(), 3);
        assert_eq!(option_names(&selector, 2), vec!["Login", "Logout"]);
        assert_eq!(selector.levels()[2].selected, None);
        assert_eq!(selector.selections(), vec!["Web", "Auth"]);
    }

    #[test]
    fn each_selected_level_is_child_of_previous() {
        let mut selector = selector();
        selector.select(0, 1).expect("api");
        selector.select(1, 0).expect("rest");
        selector.select(2, 0).expect("get");
        let levels = selector.levels();
        for pair in levels.windows(2) {
            let (Some(parent), Some(child)) = (pair[0].selected_node(), pair[1].selected_node())
            else {
                continue;
            };
            assert!(parent.children.contains(child));
        }
    }

    #[test]
    fn rejects_out_of_range_selection() {
        let mut selector = selector();
        assert!(selector.select(1, 0).is_err());
        assert!(selector.select(0, 9).is_err());
        assert_eq!(selector.levels().len(), 1);
    }

    #[test]
    fn restore_rebuilds_levels_and_open_tail() {
        let mut selector = selector();
        selector.restore(&["Web".to_string(), "Auth".to_string()]);
        assert_eq!(selector.selections(), vec!["Web", "Auth"]);
        assert_eq!(selector.levels().len(), 3);
        assert_eq!(selector.levels()[2].selected, None);
    }

    #[test]
    fn restore_stops_at_unknown_name() {
        let mut selector = selector();
        selector.select(0, 1).expect("api");
        selector.restore(&["Web".to_string(), "Nope".to_string(), "Login".to_string()]);
        assert_eq!(selector.selections(), vec!["Web"]);
        assert_eq!(selector.levels().len(), 2);
    }

    #[test]
    fn restore_with_empty_path_resets() {
        let mut selector = selector();
        selector.select(0, 0).expect("web");
        selector.restore(&[]);
        assert_eq!(selector.levels().len(), 1);
        assert!(selector.selections().is_empty());
    }
}
