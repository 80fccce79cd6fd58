#[cfg(test)]
mod test_datapath;
#[cfg(test)]
mod test_fabrics;
